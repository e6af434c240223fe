//! Runtime configuration read from the environment.

use thiserror::Error;

use crate::aggregate_handler::{DEFAULT_SNAPSHOT_REVISION, SnapshotPolicy};
use crate::event_bus::PublishMode;

/// Minimum version advance before snapshotting; negative disables it.
pub const SNAPSHOT_MIN_VERSION_DIFF_VAR: &str = "EVENTIDE_SNAPSHOT_MIN_VERSION_DIFF";
/// Snapshot revision label.
pub const SNAPSHOT_REVISION_VAR: &str = "EVENTIDE_SNAPSHOT_REVISION";
/// `sequential` or `concurrent`.
pub const PUBLISH_MODE_VAR: &str = "EVENTIDE_PUBLISH_MODE";
/// `true` to persist the projected state of every aggregate after a command.
pub const PROJECT_AGGREGATES_VAR: &str = "EVENTIDE_PROJECT_AGGREGATES";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        /// The variable name.
        key: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Settings that shape the engine at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Snapshot threshold; `-1` (the default) disables snapshotting.
    pub snapshot_min_version_diff: i64,
    /// Snapshot revision label.
    pub snapshot_revision: String,
    /// How events are handed to publishers.
    pub publish_mode: PublishMode,
    /// Persist each aggregate's state after every command.
    pub project_aggregates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_min_version_diff: -1,
            snapshot_revision: DEFAULT_SNAPSHOT_REVISION.to_owned(),
            publish_mode: PublishMode::Sequential,
            project_aggregates: false,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set to an unusable
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; unset keys keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value is set but unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(SNAPSHOT_MIN_VERSION_DIFF_VAR) {
            config.snapshot_min_version_diff =
                value.trim().parse().map_err(|err: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        key: SNAPSHOT_MIN_VERSION_DIFF_VAR,
                        value: value.clone(),
                        reason: err.to_string(),
                    }
                })?;
        }

        if let Some(value) = lookup(SNAPSHOT_REVISION_VAR) {
            let revision = value.trim();
            if revision.is_empty() {
                return Err(ConfigError::Invalid {
                    key: SNAPSHOT_REVISION_VAR,
                    value,
                    reason: "revision must not be empty".to_owned(),
                });
            }
            config.snapshot_revision = revision.to_owned();
        }

        if let Some(value) = lookup(PUBLISH_MODE_VAR) {
            config.publish_mode = value.parse().map_err(|reason| ConfigError::Invalid {
                key: PUBLISH_MODE_VAR,
                value: value.clone(),
                reason,
            })?;
        }

        if let Some(value) = lookup(PROJECT_AGGREGATES_VAR) {
            config.project_aggregates = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: PROJECT_AGGREGATES_VAR,
                        value,
                        reason: "expected true or false".to_owned(),
                    });
                }
            };
        }

        Ok(config)
    }

    /// Returns the snapshot policy these settings describe.
    #[must_use]
    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy::every(self.snapshot_min_version_diff)
            .with_revision(self.snapshot_revision.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_disable_snapshots() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, EngineConfig::default());
        assert!(!config.snapshot_policy().is_enabled());
        assert_eq!(config.snapshot_policy().revision, "v1");
    }

    #[test]
    fn test_reads_all_variables() {
        let config = EngineConfig::from_lookup(lookup(&[
            (SNAPSHOT_MIN_VERSION_DIFF_VAR, "10"),
            (SNAPSHOT_REVISION_VAR, "v2"),
            (PUBLISH_MODE_VAR, "concurrent"),
            (PROJECT_AGGREGATES_VAR, "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.snapshot_min_version_diff, 10);
        assert_eq!(config.snapshot_revision, "v2");
        assert_eq!(config.publish_mode, PublishMode::Concurrent);
        assert!(config.project_aggregates);
        assert!(config.snapshot_policy().should_snapshot(11));
        assert!(!config.snapshot_policy().should_snapshot(10));
    }

    #[test]
    fn test_rejects_non_numeric_threshold() {
        let err = EngineConfig::from_lookup(lookup(&[(SNAPSHOT_MIN_VERSION_DIFF_VAR, "often")]))
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid { key: SNAPSHOT_MIN_VERSION_DIFF_VAR, .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_publish_mode() {
        let err = EngineConfig::from_lookup(lookup(&[(PUBLISH_MODE_VAR, "parallel")])).unwrap_err();

        assert!(err.to_string().contains("EVENTIDE_PUBLISH_MODE"));
    }

    #[test]
    fn test_rejects_unparseable_projection_flag() {
        let err = EngineConfig::from_lookup(lookup(&[(PROJECT_AGGREGATES_VAR, "sometimes")])).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: PROJECT_AGGREGATES_VAR, .. }));
    }

    #[test]
    fn test_rejects_blank_revision() {
        let err = EngineConfig::from_lookup(lookup(&[(SNAPSHOT_REVISION_VAR, "  ")])).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: SNAPSHOT_REVISION_VAR, .. }));
    }
}
