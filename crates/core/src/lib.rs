//! # splitd-core
//!
//! Shared vocabulary of the splitd daemon: client identity and queue tags,
//! impressions and events, the [`Evaluator`] and [`Recorder`] contracts, and
//! the error type every crate converts backend failures into.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod evaluator;
pub mod recorder;
pub mod result;
pub mod types;

pub use error::Error;
pub use evaluator::{
    CONTROL_TREATMENT, EvaluationResult, Evaluator, FlagDefinition, LocalRuleSet, SplitView,
    labels,
};
pub use recorder::{
    EventRecord, FeatureImpressions, ImpressionRow, ImpressionsBatch, Recorder, group_by_feature,
};
pub use result::Result;
pub use types::{
    Attribute, Attributes, ClientIdentity, ClientTag, Event, FLAG_RETURN_IMPRESSION_DATA,
    Impression, RegisterFlags, now_millis,
};
