//! Envelope codec
//!
//! Envelopes are CBOR: self-describing, compact, and able to carry the
//! heterogeneous argument lists RPCs need without a schema.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Name under which the CBOR codec is registered in configuration.
pub const CBOR_CODEC: &str = "cbor";

/// Serialisation format used on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Cbor,
}

impl Codec {
    /// Look a codec up by its configured name.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownCodec`] for names that are not registered.
    pub fn from_name(name: &str) -> Result<Self, CodecError> {
        match name {
            CBOR_CODEC => Ok(Self::Cbor),
            other => Err(CodecError::UnknownCodec {
                name: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cbor => CBOR_CODEC,
        }
    }

    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] when `value` cannot be encoded.
    pub fn serialize<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Cbor => {
                let mut out = Vec::new();
                ciborium::into_writer(value, &mut out)
                    .map_err(|e| CodecError::serialization(e.to_string()))?;
                Ok(out)
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`CodecError::Parse`] when `bytes` are not a valid encoding of `T`.
    pub fn parse<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Self::Cbor => ciborium::from_reader(bytes).map_err(|e| CodecError::parse(e.to_string())),
        }
    }
}

impl FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Codec::from_name("cbor"), Ok(Codec::Cbor));
        assert_eq!("cbor".parse::<Codec>(), Ok(Codec::Cbor));
        assert_eq!(
            Codec::from_name("msgpack"),
            Err(CodecError::UnknownCodec {
                name: "msgpack".to_string()
            })
        );
        assert_eq!(Codec::Cbor.to_string(), "cbor");
    }

    #[test]
    fn test_serialize_then_parse_map() {
        let mut value = BTreeMap::new();
        value.insert("t".to_string(), "on".to_string());

        let bytes = Codec::Cbor.serialize(&value).unwrap();
        let back: BTreeMap<String, String> = Codec::Cbor.parse(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_garbage_fails_to_parse() {
        let err = Codec::Cbor.parse::<BTreeMap<String, String>>(&[0xff, 0x00, 0x13]);
        assert!(matches!(err, Err(CodecError::Parse { .. })));
    }
}
