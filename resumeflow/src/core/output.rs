//! Step output and usage counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource counters reported by a step and accumulated on the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens sent to generation models.
    #[serde(default)]
    pub input_tokens: u64,
    /// Tokens produced by generation models.
    #[serde(default)]
    pub output_tokens: u64,
    /// Billable external API calls.
    #[serde(default)]
    pub api_calls: u64,
}

impl Usage {
    /// Creates usage with token counts.
    #[must_use]
    pub fn tokens(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            api_calls: 0,
        }
    }

    /// Sets the API call count.
    #[must_use]
    pub fn with_api_calls(mut self, api_calls: u64) -> Self {
        self.api_calls = api_calls;
        self
    }

    /// Adds `other` into `self`, saturating.
    pub fn merge(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.api_calls = self.api_calls.saturating_add(other.api_calls);
    }

    /// Returns true if every counter is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// The result of a successful step (or of a fallback standing in for one).
///
/// `data` entries are merged into the pipeline context under their keys,
/// so later steps read what earlier steps produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Produced values, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,

    /// Usage counters to merge into the job.
    #[serde(default, skip_serializing_if = "Usage::is_zero")]
    pub usage: Usage,
}

impl StepOutput {
    /// Creates an output with data.
    #[must_use]
    pub fn new(data: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            usage: Usage::default(),
        }
    }

    /// Creates an output with no data.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an output with a single value.
    #[must_use]
    pub fn value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::empty().with_value(key, value)
    }

    /// Adds a value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Sets the usage counters.
    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns the produced keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_merge() {
        let mut total = Usage::tokens(100, 20);
        total.merge(&Usage::tokens(5, 5).with_api_calls(2));
        assert_eq!(total, Usage { input_tokens: 105, output_tokens: 25, api_calls: 2 });
    }

    #[test]
    fn test_usage_merge_saturates() {
        let mut total = Usage::tokens(u64::MAX, 0);
        total.merge(&Usage::tokens(1, 0));
        assert_eq!(total.input_tokens, u64::MAX);
    }

    #[test]
    fn test_step_output_values() {
        let output = StepOutput::value("script", json!("print(1)"))
            .with_value("scene_count", json!(3))
            .with_usage(Usage::tokens(10, 40));

        assert_eq!(output.get("script"), Some(&json!("print(1)")));
        assert_eq!(output.keys(), vec!["scene_count", "script"]);
        assert_eq!(output.usage.output_tokens, 40);
    }

    #[test]
    fn test_empty_output_serializes_compactly() {
        let json = serde_json::to_string(&StepOutput::empty()).unwrap();
        assert_eq!(json, "{}");

        let back: StepOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StepOutput::empty());
    }
}
