// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Document configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Runtime knobs of a [`Document`](crate::Document).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentConfig {
    /// Wall-clock budget of a single queue drain, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// When `false`, queued fields apply their updates immediately instead
    /// of scheduling a step.
    pub deferred_updates: bool,
    /// Log every queue event through `tracing`.
    pub trace_steps: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            deferred_updates: true,
            trace_steps: false,
        }
    }
}

impl DocumentConfig {
    /// Parses a JSON config. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Drain timeout as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = DocumentConfig::from_json(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(250)));
        assert!(cfg.deferred_updates);
        assert!(!cfg.trace_steps);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            DocumentConfig::from_json(r#"{"timeout": 1}"#),
            Err(ConfigError::Serde(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let cfg = DocumentConfig {
            timeout_ms: Some(5),
            deferred_updates: false,
            trace_steps: true,
        };
        let back = DocumentConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
