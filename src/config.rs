//! Engine configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minimum number of daily logs before an insight is requested
pub const DEFAULT_INSIGHT_MIN_LOGS: usize = 3;
/// Number of most recent logs sent for analysis
pub const DEFAULT_INSIGHT_WINDOW: usize = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// When and how much to ask the analysis collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct InsightPolicy {
    pub min_logs: usize,
    pub window: usize,
}

impl Default for InsightPolicy {
    fn default() -> Self {
        Self {
            min_logs: DEFAULT_INSIGHT_MIN_LOGS,
            window: DEFAULT_INSIGHT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct EngineConfig {
    pub insight: InsightPolicy,
    /// Directory for the file-backed store (CLI only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.insight.min_logs == 0 {
            return Err(ConfigError::Invalid("insight.min_logs must be at least 1".into()));
        }
        if self.insight.window == 0 {
            return Err(ConfigError::Invalid("insight.window must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.insight.min_logs, 3);
        assert_eq!(config.insight.window, 7);
        assert_eq!(config.data_dir, None);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{"insight":{"window":5}}"#).unwrap();
        assert_eq!(config.insight.window, 5);
        assert_eq!(config.insight.min_logs, 3);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"insights":{}}"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"insight":{"window":0}}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhythm.json");
        fs::write(&path, r#"{"data_dir":"/tmp/rhythm"}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/rhythm")));

        assert!(EngineConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
