//! `SOCK_SEQPACKET` Unix sockets on the tokio reactor.
//!
//! Tokio only ships stream and datagram Unix sockets. Seqpacket sockets are
//! created with `socket2` and registered with the reactor through [`AsyncFd`];
//! every read returns at most one message and every write sends exactly one.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use socket2::{Domain, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Pending-connection backlog passed to `listen(2)`.
pub const LISTEN_BACKLOG: i32 = 128;

/// Listening seqpacket socket.
#[derive(Debug)]
pub struct SeqPacketListener {
    inner: AsyncFd<Socket>,
}

impl SeqPacketListener {
    /// Bind and listen on `path`. The path must not exist.
    ///
    /// # Errors
    ///
    /// Returns any error from socket creation, `bind(2)` or `listen(2)`.
    pub fn bind(path: &Path) -> io::Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::unix(path)?)?;
        socket.listen(LISTEN_BACKLOG)?;
        Ok(Self {
            inner: AsyncFd::new(socket)?,
        })
    }

    /// Wait for the next incoming connection.
    ///
    /// # Errors
    ///
    /// Returns any error from `accept(2)` other than `EWOULDBLOCK`.
    pub async fn accept(&self) -> io::Result<SeqPacketStream> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| inner.get_ref().accept()) {
                Ok(accepted) => {
                    let (socket, _peer) = accepted?;
                    return SeqPacketStream::from_socket(socket);
                }
                Err(_would_block) => {}
            }
        }
    }
}

/// Connected seqpacket socket.
#[derive(Debug)]
pub struct SeqPacketStream {
    inner: AsyncFd<Socket>,
}

impl SeqPacketStream {
    fn from_socket(socket: Socket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            inner: AsyncFd::new(socket)?,
        })
    }

    /// Connect to a listening seqpacket socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns any error from socket creation or `connect(2)`, notably
    /// `ConnectionRefused` when nothing listens on a leftover socket file.
    pub async fn connect(path: &Path) -> io::Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
        let address = SockAddr::unix(path)?;
        // Unix-domain connects complete or fail immediately.
        socket.connect(&address)?;
        Self::from_socket(socket)
    }
}

impl AsyncRead for SeqPacketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(read)) => {
                    buf.advance(read);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => {}
            }
        }
    }
}

impl AsyncWrite for SeqPacketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => {}
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.inner.get_ref().shutdown(Shutdown::Write))
    }
}
