//! Response payloads, keyed with the same short names clients expect.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use splitd_core::SplitView;

/// Impression metadata echoed to clients registered with the impression flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionListenerData {
    #[serde(rename = "l")]
    pub label: String,
    #[serde(rename = "m")]
    pub time_ms: i64,
    #[serde(rename = "c")]
    pub change_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPayload {
    #[serde(rename = "t")]
    pub treatment: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ImpressionListenerData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentsPayload {
    #[serde(rename = "r")]
    pub results: Vec<TreatmentPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPayload {
    #[serde(rename = "s")]
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitNamesPayload {
    #[serde(rename = "n")]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitViewPayload {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "t")]
    pub traffic_type: String,
    #[serde(rename = "k")]
    pub killed: bool,
    #[serde(rename = "s")]
    pub treatments: Vec<String>,
    #[serde(rename = "c")]
    pub change_number: i64,
    #[serde(rename = "f")]
    pub configs: BTreeMap<String, String>,
    #[serde(rename = "d")]
    pub default_treatment: String,
    #[serde(rename = "e")]
    pub sets: Vec<String>,
}

impl From<SplitView> for SplitViewPayload {
    fn from(view: SplitView) -> Self {
        Self {
            name: view.name,
            traffic_type: view.traffic_type,
            killed: view.killed,
            treatments: view.treatments,
            change_number: view.change_number,
            configs: view.configs,
            default_treatment: view.default_treatment,
            sets: view.sets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPayload {
    #[serde(rename = "s")]
    pub split: Option<SplitViewPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitsPayload {
    #[serde(rename = "s")]
    pub splits: Vec<SplitViewPayload>,
}

/// Any payload the v1 dispatcher can answer with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Treatment(TreatmentPayload),
    Treatments(TreatmentsPayload),
    Track(TrackPayload),
    SplitNames(SplitNamesPayload),
    Split(SplitPayload),
    Splits(SplitsPayload),
}
