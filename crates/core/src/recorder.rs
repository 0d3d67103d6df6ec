//! Recorder contract: where flushed impressions and events go.
//!
//! Batch types serialise to the bulk-upload JSON shape expected by the
//! events backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::Result;
use crate::types::{Attributes, ClientTag, Event, Impression};

/// One impression row inside a per-feature group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionRow {
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "b", skip_serializing_if = "Option::is_none", default)]
    pub bucketing_key: Option<String>,
    #[serde(rename = "t")]
    pub treatment: String,
    #[serde(rename = "r")]
    pub label: String,
    #[serde(rename = "c")]
    pub change_number: i64,
    #[serde(rename = "m")]
    pub time: i64,
}

impl From<Impression> for ImpressionRow {
    fn from(imp: Impression) -> Self {
        Self {
            key: imp.key,
            bucketing_key: imp.bucketing_key,
            treatment: imp.treatment,
            label: imp.label,
            change_number: imp.change_number,
            time: imp.time,
        }
    }
}

/// All impressions for one feature within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureImpressions {
    #[serde(rename = "f")]
    pub feature: String,
    #[serde(rename = "i")]
    pub impressions: Vec<ImpressionRow>,
}

/// Grouped impressions, one entry per feature.
pub type ImpressionsBatch = Vec<FeatureImpressions>;

/// Event in its upload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub key: String,
    pub traffic_type_name: String,
    pub event_type_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<f64>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub properties: Option<Attributes>,
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            key: event.key,
            traffic_type_name: event.traffic_type,
            event_type_id: event.event_type,
            value: event.value,
            timestamp: event.timestamp,
            properties: event.properties,
        }
    }
}

/// Group impressions by feature, keeping features in order of first appearance
/// and rows in queue order.
#[must_use]
pub fn group_by_feature(impressions: Vec<Impression>) -> ImpressionsBatch {
    let mut batch: ImpressionsBatch = Vec::new();
    for imp in impressions {
        match batch.iter_mut().find(|group| group.feature == imp.feature) {
            Some(group) => group.impressions.push(imp.into()),
            None => batch.push(FeatureImpressions {
                feature: imp.feature.clone(),
                impressions: vec![imp.into()],
            }),
        }
    }
    batch
}

/// Remote sink for impressions and events. Called concurrently from flusher
/// sub-tasks, so implementations must be thread-safe and impose their own
/// timeouts.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Upload one tag's grouped impressions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recorder`] when the backend rejects the batch.
    async fn record_impressions(&self, tag: &ClientTag, batch: ImpressionsBatch) -> Result<()>;

    /// Upload one tag's events.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recorder`] when the backend rejects the batch.
    async fn record_events(&self, tag: &ClientTag, batch: Vec<EventRecord>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn imp(key: &str, feature: &str, time: i64) -> Impression {
        Impression {
            key: key.into(),
            bucketing_key: None,
            feature: feature.into(),
            treatment: "on".into(),
            label: "default rule".into(),
            change_number: 1,
            time,
        }
    }

    #[test]
    fn test_group_by_feature_keeps_first_appearance_order() {
        let batch = group_by_feature(vec![
            imp("a", "f2", 1),
            imp("b", "f1", 2),
            imp("c", "f2", 3),
        ]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].feature, "f2");
        assert_eq!(
            batch[0].impressions.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(batch[1].feature, "f1");
        assert_eq!(batch[1].impressions[0].time, 2);
    }

    #[test]
    fn test_group_by_feature_empty() {
        assert!(group_by_feature(Vec::new()).is_empty());
    }

    #[test]
    fn test_impression_row_wire_names() {
        let row: ImpressionRow = imp("user-42", "flag_a", 5).into();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"k": "user-42", "t": "on", "r": "default rule", "c": 1, "m": 5})
        );
    }

    #[test]
    fn test_event_record_wire_names() {
        let record: EventRecord = Event {
            key: "k".into(),
            traffic_type: "user".into(),
            event_type: "checkout".into(),
            value: Some(9.5),
            properties: None,
            timestamp: 10,
        }
        .into();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "k",
                "trafficTypeName": "user",
                "eventTypeId": "checkout",
                "value": 9.5,
                "timestamp": 10
            })
        );
    }
}
