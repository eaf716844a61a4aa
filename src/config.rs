//! Engine tunables.

use crate::error::ConfigError;
use crate::memory::DEFAULT_BATCH_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings shared by all engine operations.
///
/// Missing keys take their defaults, so `{}` is a valid config:
///
/// ```
/// use fleetfold::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "batch_size": 100 }"#).unwrap();
/// assert_eq!(config.batch_size, 100);
/// assert_eq!(config.anomaly_factor, 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A month whose measured consumption exceeds the reference by more than
    /// this factor is reported as an estimate instead.
    pub anomaly_factor: f64,
    /// Upper bound on records written per `batch_update` during replay.
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            anomaly_factor: 2.0,
            batch_size: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.anomaly_factor.is_finite() || self.anomaly_factor < 1.0 {
            return Err(ConfigError::AnomalyFactor(self.anomaly_factor));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn rejects_factor_below_one() {
        let err = EngineConfig::from_json(r#"{ "anomaly_factor": 0.5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::AnomalyFactor(f) if f == 0.5));
    }

    #[test]
    fn rejects_zero_batch() {
        let err = EngineConfig::from_json(r#"{ "batch_size": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::BatchSize));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "anomaly_factor": 3.0 }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.anomaly_factor, 3.0);
        assert_eq!(config.batch_size, DEFAULT_BATCH_LIMIT);
    }
}
