//! Domain types shared by the link, the queues and the flushers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Bit 0 of the registration flags: echo impression metadata in evaluation responses.
pub const FLAG_RETURN_IMPRESSION_DATA: u64 = 0x01;

/// Registration flags declared by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegisterFlags(u64);

impl RegisterFlags {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether evaluation responses should carry label, time and change number.
    #[must_use]
    pub const fn return_impression_data(self) -> bool {
        self.0 & FLAG_RETURN_IMPRESSION_DATA != 0
    }
}

/// The `(id, sdk_version)` pair used to partition queues and annotate uploads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientTag {
    pub id: String,
    pub sdk_version: String,
}

impl ClientTag {
    pub fn new(id: impl Into<String>, sdk_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sdk_version: sdk_version.into(),
        }
    }
}

impl fmt::Display for ClientTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.sdk_version)
    }
}

/// Identity declared by a client at registration. Read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub id: String,
    pub sdk_version: String,
    pub flags: RegisterFlags,
}

impl ClientIdentity {
    pub fn new(id: impl Into<String>, sdk_version: impl Into<String>, flags: RegisterFlags) -> Self {
        Self {
            id: id.into(),
            sdk_version: sdk_version.into(),
            flags,
        }
    }

    /// The queue partition this client feeds.
    #[must_use]
    pub fn tag(&self) -> ClientTag {
        ClientTag::new(self.id.clone(), self.sdk_version.clone())
    }
}

/// A sanitised attribute or event-property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    StrList(Vec<String>),
}

/// Attribute map passed to the evaluator.
pub type Attributes = BTreeMap<String, Attribute>;

/// Audit record of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impression {
    pub key: String,
    pub bucketing_key: Option<String>,
    pub feature: String,
    pub treatment: String,
    pub label: String,
    pub change_number: i64,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

/// Business event emitted through `Track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub traffic_type: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub properties: Option<Attributes>,
    /// Milliseconds since the Unix epoch, as sent by the client.
    pub timestamp: i64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_flags_bit_zero() {
        assert!(!RegisterFlags::from_bits(0).return_impression_data());
        assert!(RegisterFlags::from_bits(1).return_impression_data());
        assert!(RegisterFlags::from_bits(0b11).return_impression_data());
        assert!(!RegisterFlags::from_bits(0b10).return_impression_data());
    }

    #[test]
    fn test_identity_tag() {
        let identity = ClientIdentity::new("id-1", "go-1.2.3", RegisterFlags::default());
        let tag = identity.tag();
        assert_eq!(tag, ClientTag::new("id-1", "go-1.2.3"));
        assert_eq!(tag.to_string(), "id-1/go-1.2.3");
    }

    #[test]
    fn test_attribute_json_is_untagged() {
        let mut attrs = Attributes::new();
        attrs.insert("plan".into(), Attribute::Str("pro".into()));
        attrs.insert("age".into(), Attribute::Int(33));
        attrs.insert("tags".into(), Attribute::StrList(vec!["a".into()]));
        attrs.insert("gone".into(), Attribute::Null);

        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"age": 33, "gone": null, "plan": "pro", "tags": ["a"]})
        );
    }
}
