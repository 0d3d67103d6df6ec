//! Local socket flavours and the stream type the rest of the link works on.

use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};

use crate::framing::Framer;
use crate::seqpacket::{SeqPacketListener, SeqPacketStream};

/// Kind of Unix-domain socket the daemon listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocketFlavor {
    /// Message-preserving socket, framed with [`Framer::Null`].
    #[default]
    UnixSeqpacket,
    /// Byte stream, framed with [`Framer::LengthPrefixed`].
    UnixStream,
}

impl SocketFlavor {
    #[must_use]
    pub const fn framer(self) -> Framer {
        match self {
            Self::UnixSeqpacket => Framer::Null,
            Self::UnixStream => Framer::LengthPrefixed,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnixSeqpacket => "unix-seqpacket",
            Self::UnixStream => "unix-stream",
        }
    }
}

impl fmt::Display for SocketFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocketFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unix-seqpacket" => Ok(Self::UnixSeqpacket),
            "unix-stream" => Ok(Self::UnixStream),
            other => Err(format!(
                "unknown socket type '{other}' (expected unix-seqpacket or unix-stream)"
            )),
        }
    }
}

/// Bound listener of either flavour.
#[derive(Debug)]
pub enum LocalListener {
    Stream(UnixListener),
    SeqPacket(SeqPacketListener),
}

impl LocalListener {
    /// # Errors
    ///
    /// Returns the bind error, e.g. `AddrInUse` when `path` already exists.
    pub fn bind(flavor: SocketFlavor, path: &Path) -> io::Result<Self> {
        match flavor {
            SocketFlavor::UnixStream => UnixListener::bind(path).map(Self::Stream),
            SocketFlavor::UnixSeqpacket => SeqPacketListener::bind(path).map(Self::SeqPacket),
        }
    }

    /// # Errors
    ///
    /// Returns the `accept(2)` error.
    pub async fn accept(&self) -> io::Result<LocalStream> {
        match self {
            Self::Stream(listener) => listener
                .accept()
                .await
                .map(|(stream, _peer)| LocalStream::Stream(stream)),
            Self::SeqPacket(listener) => listener.accept().await.map(LocalStream::SeqPacket),
        }
    }
}

/// Connected socket of either flavour.
#[derive(Debug)]
pub enum LocalStream {
    Stream(UnixStream),
    SeqPacket(SeqPacketStream),
}

impl LocalStream {
    /// # Errors
    ///
    /// Returns the `connect(2)` error.
    pub async fn connect(flavor: SocketFlavor, path: &Path) -> io::Result<Self> {
        match flavor {
            SocketFlavor::UnixStream => UnixStream::connect(path).await.map(Self::Stream),
            SocketFlavor::UnixSeqpacket => SeqPacketStream::connect(path).await.map(Self::SeqPacket),
        }
    }
}

impl AsyncRead for LocalStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stream(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::SeqPacket(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Stream(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::SeqPacket(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stream(stream) => Pin::new(stream).poll_flush(cx),
            Self::SeqPacket(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stream(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::SeqPacket(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_names_and_framers() {
        assert_eq!("unix-stream".parse(), Ok(SocketFlavor::UnixStream));
        assert_eq!("unix-seqpacket".parse(), Ok(SocketFlavor::UnixSeqpacket));
        assert!("tcp".parse::<SocketFlavor>().is_err());
        assert_eq!(SocketFlavor::UnixStream.framer(), Framer::LengthPrefixed);
        assert_eq!(SocketFlavor::UnixSeqpacket.framer(), Framer::Null);
        assert_eq!(SocketFlavor::default().to_string(), "unix-seqpacket");
    }
}
