//! Attribute sanitisation.
//!
//! Client-supplied attribute maps arrive as arbitrary CBOR. Only a handful of
//! shapes are meaningful to the evaluator; everything is coerced into
//! [`Attribute`] or dropped:
//!
//! | CBOR                          | Attribute            |
//! |-------------------------------|----------------------|
//! | text                          | `Str`                |
//! | integer fitting i64           | `Int`                |
//! | integer outside i64           | `Float`              |
//! | float                         | `Float`              |
//! | bool                          | `Bool`               |
//! | null                          | `Null`               |
//! | array                         | `StrList`, leading run of strings |
//! | tag 0 (RFC 3339 text)         | `Int` unix seconds   |
//! | tag 1 (epoch number)          | `Int` unix seconds   |
//!
//! Maps, byte strings, other tags and non-text keys are dropped.

use chrono::DateTime;
use ciborium::Value;
use splitd_core::{Attribute, Attributes};
use tracing::debug;

const TAG_DATETIME_STRING: u64 = 0;
const TAG_EPOCH_DATETIME: u64 = 1;

/// Sanitise every entry of a CBOR map, dropping what cannot be represented.
#[must_use]
pub fn sanitize_attributes(entries: &[(Value, Value)]) -> Attributes {
    entries
        .iter()
        .filter_map(|(key, value)| {
            let Value::Text(name) = key else {
                debug!(?key, "Dropping attribute with non-text key");
                return None;
            };
            match sanitize_value(value) {
                Some(attribute) => Some((name.clone(), attribute)),
                None => {
                    debug!(attribute = %name, "Dropping attribute of unsupported type");
                    None
                }
            }
        })
        .collect()
}

/// Coerce one CBOR value, or `None` when it has no attribute representation.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sanitize_value(value: &Value) -> Option<Attribute> {
    match value {
        Value::Null => Some(Attribute::Null),
        Value::Bool(b) => Some(Attribute::Bool(*b)),
        Value::Text(s) => Some(Attribute::Str(s.clone())),
        Value::Float(f) => Some(Attribute::Float(*f)),
        Value::Integer(i) => Some(
            i64::try_from(*i).map_or_else(|_| Attribute::Float(i128::from(*i) as f64), Attribute::Int),
        ),
        Value::Array(items) => Some(Attribute::StrList(
            items
                .iter()
                .map_while(|item| item.as_text().map(str::to_string))
                .collect(),
        )),
        Value::Tag(TAG_DATETIME_STRING, inner) => inner
            .as_text()
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
            .map(|dt| Attribute::Int(dt.timestamp())),
        Value::Tag(TAG_EPOCH_DATETIME, inner) => epoch_seconds(inner).map(Attribute::Int),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => i64::try_from(*i).ok(),
        Value::Float(f) if f.is_finite() => Some(f.floor() as i64),
        _ => None,
    }
}
