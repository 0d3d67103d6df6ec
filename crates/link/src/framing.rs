//! Message framing over byte streams and message-preserving sockets
//!
//! ```text
//! Null (seqpacket):        | payload (one datagram)           |
//!
//! Length-prefixed (stream):
//! +--------+--------+--------+--------+--------------------------+
//! |      Length (little-endian u32)   |    Payload (N bytes)     |
//! +--------+--------+--------+--------+--------------------------+
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FramingError;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Result type for framing operations
pub type FramingResult<T> = Result<T, FramingError>;

/// How messages are delimited on a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framer {
    /// The socket preserves message boundaries; frames are the raw payload.
    Null,
    /// 4-byte little-endian size header followed by the payload.
    LengthPrefixed,
}

impl Framer {
    /// Bytes that go on the wire for `payload`.
    #[must_use]
    pub fn frame(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Self::Null => payload.to_vec(),
            Self::LengthPrefixed => {
                let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
                framed.extend_from_slice(&encode_length(payload.len()));
                framed.extend_from_slice(payload);
                framed
            }
        }
    }

    /// Read one message into `buf`, returning its size.
    ///
    /// # Errors
    ///
    /// - [`FramingError::Eof`] when the peer closed before a new message
    /// - [`FramingError::InsufficientHeader`] when the stream ends inside the prefix
    /// - [`FramingError::OversizedMessage`] when the prefix exceeds `buf.len()`
    /// - [`FramingError::BufferTooSmall`] when a datagram filled all of `buf`
    /// - [`FramingError::Io`] for socket errors and truncated bodies
    pub async fn read_frame<R>(self, reader: &mut R, buf: &mut [u8]) -> FramingResult<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        match self {
            Self::Null => read_datagram(reader, buf).await,
            Self::LengthPrefixed => read_prefixed(reader, buf).await,
        }
    }

    /// Write one message, returning the payload bytes written (prefix excluded).
    ///
    /// # Errors
    ///
    /// - [`FramingError::ShortWrite`] when a datagram was only partly accepted
    /// - [`FramingError::OversizedMessage`] when the payload cannot be described
    ///   by a 32-bit prefix
    /// - [`FramingError::Io`] for socket errors
    pub async fn write_frame<W>(self, writer: &mut W, payload: &[u8]) -> FramingResult<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self {
            Self::Null => {
                let written = writer.write(payload).await?;
                if written < payload.len() {
                    return Err(FramingError::short_write(written, payload.len()));
                }
                Ok(written)
            }
            Self::LengthPrefixed => {
                if u32::try_from(payload.len()).is_err() {
                    return Err(FramingError::oversized(payload.len(), u32::MAX as usize));
                }
                writer.write_all(&self.frame(payload)).await?;
                writer.flush().await?;
                Ok(payload.len())
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_length(len: usize) -> [u8; LENGTH_PREFIX_SIZE] {
    (len as u32).to_le_bytes()
}

async fn read_datagram<R>(reader: &mut R, buf: &mut [u8]) -> FramingResult<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let read = reader.read(buf).await?;
    if read == 0 {
        return Err(FramingError::Eof);
    }
    if read == buf.len() {
        return Err(FramingError::BufferTooSmall {
            capacity: buf.len(),
        });
    }
    Ok(read)
}

async fn read_prefixed<R>(reader: &mut R, buf: &mut [u8]) -> FramingResult<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    let mut got = 0;
    while got < LENGTH_PREFIX_SIZE {
        let read = reader.read(&mut header[got..]).await?;
        if read == 0 {
            return Err(if got == 0 {
                FramingError::Eof
            } else {
                FramingError::InsufficientHeader { got }
            });
        }
        got += read;
    }

    let size = u32::from_le_bytes(header) as usize;
    let Some(body) = buf.get_mut(..size) else {
        return Err(FramingError::oversized(size, buf.len()));
    };
    reader.read_exact(body).await?;
    Ok(size)
}
