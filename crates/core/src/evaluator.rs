//! Evaluator contract and the local rule-set evaluator.
//!
//! The daemon never computes treatments itself; it asks an [`Evaluator`].
//! Implementations must be thread-safe and side-effect free: the same input
//! against the same rule set yields the same result.
//!
//! [`LocalRuleSet`] is the evaluator shipped with the daemon. It is loaded once
//! from a YAML file of flags:
//!
//! ```yaml
//! - name: flag_a
//!   traffic_type: user
//!   default_treatment: "off"
//!   treatments: ["on", "off"]
//!   change_number: 100
//!   keys:
//!     user-42: "on"
//!   configs:
//!     "on": '{"color":"blue"}'
//!   sets: [frontend]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;
use crate::types::Attributes;

/// Treatment returned for flags the rule set does not know.
pub const CONTROL_TREATMENT: &str = "control";

/// Labels attached to impressions.
pub mod labels {
    pub const DEFINITION_NOT_FOUND: &str = "definition not found";
    pub const KILLED: &str = "killed";
    pub const WHITELISTED: &str = "whitelisted";
    pub const DEFAULT_RULE: &str = "default rule";
}

/// Outcome of evaluating one flag for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub treatment: String,
    pub label: String,
    pub change_number: i64,
    pub config: Option<String>,
}

/// Read-only view of one flag definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitView {
    pub name: String,
    pub traffic_type: String,
    pub killed: bool,
    pub treatments: Vec<String>,
    pub change_number: i64,
    pub configs: BTreeMap<String, String>,
    pub default_treatment: String,
    pub sets: Vec<String>,
}

/// Evaluates flags and exposes a read-only view of the rule set.
pub trait Evaluator: Send + Sync {
    /// Evaluate `feature` for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] when the rule set cannot produce a result.
    fn evaluate(
        &self,
        key: &str,
        bucketing_key: Option<&str>,
        feature: &str,
        attributes: Option<&Attributes>,
    ) -> Result<EvaluationResult>;

    /// Names of every known flag.
    fn split_names(&self) -> Vec<String>;

    /// View of one flag, if known.
    fn split(&self, name: &str) -> Option<SplitView>;

    /// Views of every known flag.
    fn splits(&self) -> Vec<SplitView>;
}

/// One flag definition as written in the rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    #[serde(default = "default_traffic_type")]
    pub traffic_type: String,
    #[serde(default)]
    pub killed: bool,
    #[serde(default = "default_treatment")]
    pub default_treatment: String,
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default)]
    pub change_number: i64,
    /// Per-key treatment overrides.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
    /// Configuration string per treatment.
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    #[serde(default)]
    pub sets: Vec<String>,
}

fn default_traffic_type() -> String {
    "user".to_string()
}

fn default_treatment() -> String {
    CONTROL_TREATMENT.to_string()
}

impl FlagDefinition {
    fn view(&self) -> SplitView {
        let mut treatments = self.treatments.clone();
        if !treatments.contains(&self.default_treatment) {
            treatments.push(self.default_treatment.clone());
        }
        SplitView {
            name: self.name.clone(),
            traffic_type: self.traffic_type.clone(),
            killed: self.killed,
            treatments,
            change_number: self.change_number,
            configs: self.configs.clone(),
            default_treatment: self.default_treatment.clone(),
            sets: self.sets.clone(),
        }
    }
}

/// In-memory rule set loaded from a local YAML file.
#[derive(Debug, Clone, Default)]
pub struct LocalRuleSet {
    flags: HashMap<String, FlagDefinition>,
}

impl LocalRuleSet {
    /// Build a rule set from already-parsed definitions. Later duplicates win.
    #[must_use]
    pub fn new(definitions: impl IntoIterator<Item = FlagDefinition>) -> Self {
        Self {
            flags: definitions
                .into_iter()
                .map(|def| (def.name.clone(), def))
                .collect(),
        }
    }

    /// Parse a YAML list of flag definitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::YamlParseFailed`] if the document is not a list of flags.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let definitions: Vec<FlagDefinition> = serde_yaml::from_str(content)
            .map_err(|e| Error::yaml_parse_failed(e.to_string()))?;
        Ok(Self::new(definitions))
    }

    /// Load a rules file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileReadFailed`] or [`Error::YamlParseFailed`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        let rule_set = Self::from_yaml(&content)?;
        tracing::info!(path = %path.display(), flags = rule_set.len(), "Loaded local rule set");
        Ok(rule_set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Evaluator for LocalRuleSet {
    fn evaluate(
        &self,
        key: &str,
        _bucketing_key: Option<&str>,
        feature: &str,
        _attributes: Option<&Attributes>,
    ) -> Result<EvaluationResult> {
        let Some(flag) = self.flags.get(feature) else {
            return Ok(EvaluationResult {
                treatment: CONTROL_TREATMENT.to_string(),
                label: labels::DEFINITION_NOT_FOUND.to_string(),
                change_number: -1,
                config: None,
            });
        };

        let (treatment, label) = if flag.killed {
            (flag.default_treatment.clone(), labels::KILLED)
        } else if let Some(treatment) = flag.keys.get(key) {
            (treatment.clone(), labels::WHITELISTED)
        } else {
            (flag.default_treatment.clone(), labels::DEFAULT_RULE)
        };

        Ok(EvaluationResult {
            config: flag.configs.get(&treatment).cloned(),
            treatment,
            label: label.to_string(),
            change_number: flag.change_number,
        })
    }

    fn split_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flags.keys().cloned().collect();
        names.sort();
        names
    }

    fn split(&self, name: &str) -> Option<SplitView> {
        self.flags.get(name).map(FlagDefinition::view)
    }

    fn splits(&self) -> Vec<SplitView> {
        let mut views: Vec<SplitView> = self.flags.values().map(FlagDefinition::view).collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }
}
