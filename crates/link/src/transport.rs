//! Per-connection transport
//!
//! Owns the socket, a fixed-capacity read buffer and the framer. Every send
//! and receive runs under its own fresh deadline.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

use crate::error::{LinkError, LinkResult};
use crate::framing::Framer;

/// Default read buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Deadlines and buffer sizing applied to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Duplex message transport over a framed socket.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    framer: Framer,
    buffer: Vec<u8>,
    options: TransportOptions,
    closed: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[must_use]
    pub fn new(stream: S, framer: Framer, options: TransportOptions) -> Self {
        Self {
            stream,
            framer,
            buffer: vec![0u8; options.buffer_size.max(1)],
            options,
            closed: false,
        }
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Closed`] after [`Transport::shutdown`]
    /// - [`LinkError::Timeout`] when the write deadline expires
    /// - [`LinkError::Framing`] for socket and framing failures
    pub async fn send_message(&mut self, payload: &[u8]) -> LinkResult<()> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let deadline = self.options.write_timeout;
        let written = timeout(deadline, self.framer.write_frame(&mut self.stream, payload))
            .await
            .map_err(|_| LinkError::timeout("send", deadline))??;
        trace!(bytes = written, "Sent message");
        Ok(())
    }

    /// Receive one message. The returned slice is valid until the next call.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Closed`] after [`Transport::shutdown`]
    /// - [`LinkError::Timeout`] when the read deadline expires
    /// - [`LinkError::Framing`] for socket and framing failures, including a
    ///   clean [`crate::FramingError::Eof`]
    pub async fn receive_message(&mut self) -> LinkResult<&[u8]> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        let deadline = self.options.read_timeout;
        let size = timeout(
            deadline,
            self.framer.read_frame(&mut self.stream, &mut self.buffer),
        )
        .await
        .map_err(|_| LinkError::timeout("receive", deadline))??;
        trace!(bytes = size, "Received message");
        Ok(self.buffer.get(..size).unwrap_or_default())
    }

    /// Close the write half. Calling it more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the socket error from the first shutdown, other than the peer
    /// having already gone away.
    pub async fn shutdown(&mut self) -> LinkResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(LinkError::io("shutdown failed", e)),
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn framer(&self) -> Framer {
        self.framer
    }

    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tokio::io::{DuplexStream, duplex};

    use super::*;

    fn pair(options: TransportOptions) -> (Transport<DuplexStream>, Transport<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        (
            Transport::new(a, Framer::LengthPrefixed, options),
            Transport::new(b, Framer::LengthPrefixed, options),
        )
    }

    #[tokio::test]
    async fn test_send_receive_bidirectional() {
        let (mut client, mut server) = pair(TransportOptions::default());

        client.send_message(b"from client").await.unwrap();
        server.send_message(b"from server").await.unwrap();

        assert_eq!(server.receive_message().await.unwrap(), b"from client");
        assert_eq!(client.receive_message().await.unwrap(), b"from server");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_deadline_expires() {
        let options = TransportOptions {
            read_timeout: Duration::from_millis(50),
            ..TransportOptions::default()
        };
        let (_client, mut server) = pair(options);

        let err = server.receive_message().await.unwrap_err();
        assert!(matches!(err, LinkError::Timeout { operation: "receive", .. }));
    }

    #[tokio::test]
    async fn test_peer_shutdown_surfaces_eof() {
        let (mut client, mut server) = pair(TransportOptions::default());
        client.shutdown().await.unwrap();
        client.shutdown().await.unwrap();
        assert!(client.is_closed());

        assert!(server.receive_message().await.unwrap_err().is_eof());
        assert!(matches!(
            client.send_message(b"late").await,
            Err(LinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let options = TransportOptions {
            buffer_size: 8,
            ..TransportOptions::default()
        };
        let (mut client, mut server) = pair(options);
        client.send_message(&[0u8; 32]).await.unwrap();

        let err = server.receive_message().await.unwrap_err();
        assert!(matches!(
            err,
            LinkError::Framing(crate::FramingError::OversizedMessage { size: 32, capacity: 8 })
        ));
    }
}
