//! Engine Configuration
//!
//! A handful of tuning constants drive the engine: how often Snap observer
//! queues are compacted, how long a scheduler drain pass may run before it
//! yields to the host, the cadence of animation frames on the virtual host,
//! and whether animations play at all.
//!
//! The configuration is process-wide. It is read through [`current`], which
//! returns a snapshot, and replaced through [`install`], which validates first.
//!
//! # Loading
//!
//! ```rust,ignore
//! let config = EngineConfig::from_json_str(r#"{ "scheduler_budget_ms": 25.0 }"#)?;
//! trellis_core::config::install(config)?;
//! ```
//!
//! Missing fields take their defaults; unknown fields are rejected.

use std::path::Path;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunable engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Observer queues are compacted every time their length reaches a
    /// multiple of this value.
    pub waiter_compaction_threshold: usize,

    /// Time budget of one scheduler drain pass, in milliseconds.
    pub scheduler_budget_ms: f64,

    /// Interval between animation frames on the virtual host, in milliseconds.
    pub frame_interval_ms: f64,

    /// When false, animations finish immediately and the reconciler patches
    /// without waiting for a frame.
    pub animations_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            waiter_compaction_threshold: 20,
            scheduler_budget_ms: 40.0,
            frame_interval_ms: 1000.0 / 60.0,
            animations_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON text and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::ConfigIo {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        if self.waiter_compaction_threshold == 0 {
            return Err(Error::ConfigValidation(
                "waiter_compaction_threshold must be at least 1".into(),
            ));
        }
        if !(self.scheduler_budget_ms.is_finite() && self.scheduler_budget_ms > 0.0) {
            return Err(Error::ConfigValidation(format!(
                "scheduler_budget_ms must be a positive number, got {}",
                self.scheduler_budget_ms
            )));
        }
        if !(self.frame_interval_ms.is_finite() && self.frame_interval_ms > 0.0) {
            return Err(Error::ConfigValidation(format!(
                "frame_interval_ms must be a positive number, got {}",
                self.frame_interval_ms
            )));
        }
        Ok(())
    }
}

static CONFIG: OnceLock<RwLock<EngineConfig>> = OnceLock::new();

fn global() -> &'static RwLock<EngineConfig> {
    CONFIG.get_or_init(|| RwLock::new(EngineConfig::default()))
}

/// Snapshot of the active configuration.
pub fn current() -> EngineConfig {
    global().read().clone()
}

/// Validate and install a new process-wide configuration.
pub fn install(config: EngineConfig) -> Result<()> {
    config.validate()?;
    tracing::debug!(?config, "installing engine configuration");
    *global().write() = config;
    Ok(())
}

pub(crate) fn waiter_compaction_threshold() -> usize {
    global().read().waiter_compaction_threshold
}

pub(crate) fn animations_enabled() -> bool {
    global().read().animations_enabled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.waiter_compaction_threshold, 20);
        assert_eq!(config.scheduler_budget_ms, 40.0);
        assert!(config.animations_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "scheduler_budget_ms": 25.0 }"#).unwrap();
        assert_eq!(config.scheduler_budget_ms, 25.0);
        assert_eq!(config.waiter_compaction_threshold, 20);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "budget": 1 }"#).unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let err = EngineConfig::from_json_str(r#"{ "waiter_compaction_threshold": 0 }"#)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_path("/definitely/not/here.json").unwrap_err();
        match err {
            Error::ConfigIo { path, .. } => assert!(path.ends_with("here.json")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn install_rejects_invalid_config() {
        let bad = EngineConfig {
            frame_interval_ms: -1.0,
            ..EngineConfig::default()
        };
        assert!(install(bad).is_err());
        // The active configuration is untouched.
        assert!(current().frame_interval_ms > 0.0);
    }
}
