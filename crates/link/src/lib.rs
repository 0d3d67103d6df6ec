//! # splitd-link
//!
//! The local link between SDK clients and the splitd daemon.
//!
//! ```text
//! socket -> Framer -> Transport -> Codec -> V1Dispatcher -> Evaluator
//!                                                        -> TagFanIn (impressions, events)
//! ```
//!
//! # Framing
//!
//! - `unix-seqpacket`: the socket preserves message boundaries, frames are
//!   the raw payload.
//! - `unix-stream`: every frame is a 4-byte little-endian length prefix
//!   followed by the payload. Oversized prefixes are rejected before the body
//!   is read.
//!
//! # Envelopes
//!
//! CBOR maps with short keys: requests are `{"v", "o", "a"}` (version, opcode,
//! positional args) and responses `{"s", "p"}` (status, payload).
//!
//! # Connection rules
//!
//! - The first RPC must be `Register`; anything else gets one `InternalError`
//!   and the connection is closed.
//! - Later RPCs must keep the registered protocol version.
//! - Argument, unknown-opcode and evaluation errors answer `InternalError`
//!   and keep the connection open.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod acceptor;
mod client;
mod codec;
mod error;
mod framing;
pub mod protocol;
mod seqpacket;
mod socket;
mod transport;

pub use acceptor::{
    Acceptor, AcceptorConfig, AcceptorStats, ConnectionHandler, DEFAULT_SOCKET_PATH,
    prepare_socket_path,
};
pub use client::{ClientOptions, LinkClient};
pub use codec::{CBOR_CODEC, Codec};
pub use error::{CodecError, FramingError, LinkError, LinkResult};
pub use framing::{Framer, FramingResult, LENGTH_PREFIX_SIZE};
pub use protocol::{ConnectionOutcome, V1Dispatcher};
pub use seqpacket::{SeqPacketListener, SeqPacketStream};
pub use socket::{LocalListener, LocalStream, SocketFlavor};
pub use transport::{DEFAULT_BUFFER_SIZE, Transport, TransportOptions};
