//! Link layer errors
//!
//! Framing errors describe what went wrong on the wire, codec errors what went
//! wrong turning bytes into envelopes, and [`LinkError`] wraps both together
//! with deadline and socket-lifecycle failures.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors raised while reading or writing one frame.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Peer closed the connection before any byte of a new frame.
    #[error("end of stream")]
    Eof,

    /// Stream ended part-way through the length prefix.
    #[error("incomplete length prefix: {got} of 4 bytes")]
    InsufficientHeader { got: usize },

    /// Length prefix announces more than the read buffer can hold.
    /// Raised before any body byte is consumed.
    #[error("message of {size} bytes exceeds the {capacity}-byte buffer")]
    OversizedMessage { size: usize, capacity: usize },

    /// A message-preserving read filled the whole buffer, so the message may
    /// have been truncated by the kernel.
    #[error("message filled the {capacity}-byte buffer and may be truncated")]
    BufferTooSmall { capacity: usize },

    /// The kernel accepted only part of a message-preserving write.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Create an OversizedMessage error
    #[must_use]
    pub const fn oversized(size: usize, capacity: usize) -> Self {
        Self::OversizedMessage { size, capacity }
    }

    /// Create a ShortWrite error
    #[must_use]
    pub const fn short_write(written: usize, expected: usize) -> Self {
        Self::ShortWrite { written, expected }
    }

    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// Errors raised by the envelope codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization failed: {cause}")]
    Serialization { cause: String },

    #[error("parse failed: {cause}")]
    Parse { cause: String },

    #[error("unknown codec '{name}'")]
    UnknownCodec { name: String },
}

impl CodecError {
    pub fn serialization(cause: impl Into<String>) -> Self {
        Self::Serialization {
            cause: cause.into(),
        }
    }

    pub fn parse(cause: impl Into<String>) -> Self {
        Self::Parse {
            cause: cause.into(),
        }
    }
}

/// Top-level error for transports, the acceptor and the client.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("transport is shut down")]
    Closed,

    #[error("address '{}' is in use by a live listener", .path.display())]
    AddressInUse { path: PathBuf },

    #[error("path '{}' exists and is not a socket", .path.display())]
    NotASocket { path: PathBuf },

    #[error("daemon answered with status {status:#04x}")]
    Remote { status: u8 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl LinkError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub const fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// True when the peer closed the connection cleanly.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Framing(FramingError::Eof))
    }
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;
