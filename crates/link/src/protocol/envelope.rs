//! RPC and response envelopes.

use ciborium::Value;
use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// The only protocol version this daemon speaks.
pub const PROTOCOL_V1: u8 = 0x01;

/// RPC operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Register = 0x00,
    Treatment = 0x11,
    Treatments = 0x12,
    TreatmentWithConfig = 0x13,
    TreatmentsWithConfig = 0x14,
    Track = 0x80,
    SplitNames = 0xA0,
    Split = 0xA1,
    Splits = 0xA2,
}

impl OpCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Treatment => "treatment",
            Self::Treatments => "treatments",
            Self::TreatmentWithConfig => "treatment-with-config",
            Self::TreatmentsWithConfig => "treatments-with-config",
            Self::Track => "track",
            Self::SplitNames => "split-names",
            Self::Split => "split",
            Self::Splits => "splits",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Register),
            0x11 => Ok(Self::Treatment),
            0x12 => Ok(Self::Treatments),
            0x13 => Ok(Self::TreatmentWithConfig),
            0x14 => Ok(Self::TreatmentsWithConfig),
            0x80 => Ok(Self::Track),
            0xA0 => Ok(Self::SplitNames),
            0xA1 => Ok(Self::Split),
            0xA2 => Ok(Self::Splits),
            other => Err(ProtocolError::UnknownOpCode(other)),
        }
    }
}

/// Request envelope: `{"v": version, "o": opcode, "a": [args]}`.
///
/// The opcode stays a raw byte so an unknown operation still decodes and can
/// be answered instead of tearing the connection down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    #[serde(rename = "v")]
    pub version: u8,
    #[serde(rename = "o")]
    pub opcode: u8,
    #[serde(rename = "a", default)]
    pub args: Vec<Value>,
}

impl RpcEnvelope {
    #[must_use]
    pub fn new(opcode: OpCode, args: Vec<Value>) -> Self {
        Self {
            version: PROTOCOL_V1,
            opcode: opcode.as_u8(),
            args,
        }
    }
}

/// Outcome byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 0x01,
    InternalError = 0x10,
}

impl ResponseStatus {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Response envelope: `{"s": status, "p": payload | null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<P = Value> {
    #[serde(rename = "s")]
    pub status: u8,
    #[serde(rename = "p")]
    pub payload: Option<P>,
}

impl<P> ResponseEnvelope<P> {
    #[must_use]
    pub const fn ok(payload: Option<P>) -> Self {
        Self {
            status: ResponseStatus::Ok.as_u8(),
            payload,
        }
    }

    #[must_use]
    pub const fn internal_error() -> Self {
        Self {
            status: ResponseStatus::InternalError.as_u8(),
            payload: None,
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok.as_u8()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::Codec;

    #[test]
    fn test_opcode_bytes_round_trip() {
        for op in [
            OpCode::Register,
            OpCode::Treatment,
            OpCode::Treatments,
            OpCode::TreatmentWithConfig,
            OpCode::TreatmentsWithConfig,
            OpCode::Track,
            OpCode::SplitNames,
            OpCode::Split,
            OpCode::Splits,
        ] {
            assert_eq!(OpCode::try_from(op.as_u8()).unwrap(), op);
        }
        assert!(matches!(
            OpCode::try_from(0x42),
            Err(ProtocolError::UnknownOpCode(0x42))
        ));
    }

    #[test]
    fn test_envelope_uses_short_keys() {
        let rpc = RpcEnvelope::new(OpCode::SplitNames, Vec::new());
        let bytes = Codec::Cbor.serialize(&rpc).unwrap();
        let raw: Value = Codec::Cbor.parse(&bytes).unwrap();

        let keys: Vec<String> = raw
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["v", "o", "a"]);
    }

    #[test]
    fn test_missing_args_default_to_empty() {
        let raw = Value::Map(vec![
            (Value::Text("v".into()), Value::Integer(1.into())),
            (Value::Text("o".into()), Value::Integer(0xA0.into())),
        ]);
        let bytes = Codec::Cbor.serialize(&raw).unwrap();
        let rpc: RpcEnvelope = Codec::Cbor.parse(&bytes).unwrap();
        assert_eq!(rpc, RpcEnvelope::new(OpCode::SplitNames, Vec::new()));
    }

    #[test]
    fn test_internal_error_has_null_payload() {
        let resp: ResponseEnvelope = ResponseEnvelope::internal_error();
        let bytes = Codec::Cbor.serialize(&resp).unwrap();
        let back: ResponseEnvelope = Codec::Cbor.parse(&bytes).unwrap();
        assert_eq!(back.status, 0x10);
        assert!(back.payload.is_none());
        assert!(!back.is_ok());
    }
}
