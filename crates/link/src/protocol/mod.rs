//! Wire protocol: envelopes, argument parsing, attribute sanitisation,
//! response payloads and the v1 dispatcher.

mod args;
mod attributes;
mod envelope;
mod payload;
mod v1;

use thiserror::Error;

pub use args::{
    ArgError, FromRpc, NoArgs, RegisterArgs, SplitArgs, TrackArgs, TreatmentArgs, TreatmentsArgs,
};
pub use attributes::{sanitize_attributes, sanitize_value};
pub use envelope::{OpCode, PROTOCOL_V1, ResponseEnvelope, ResponseStatus, RpcEnvelope};
pub use payload::{
    ImpressionListenerData, ResponsePayload, SplitPayload, SplitNamesPayload, SplitViewPayload,
    SplitsPayload, TrackPayload, TreatmentPayload, TreatmentsPayload,
};
pub use v1::{ConnectionOutcome, V1Dispatcher};

/// Violations of the connection state machine and per-RPC failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#04x}")]
    UnknownOpCode(u8),

    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("opcode {opcode:#04x} received before registration")]
    NotRegistered { opcode: u8 },

    #[error("client already registered")]
    AlreadyRegistered,

    #[error("version mismatch: registered {registered:#04x}, got {got:#04x}")]
    VersionMismatch { registered: u8, got: u8 },

    #[error(transparent)]
    Args(#[from] ArgError),

    #[error(transparent)]
    Backend(#[from] splitd_core::Error),
}
