//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use verdict_types::EngineParams;
use verdict_utils::LogFormat;

use crate::ConsensusError;

/// Configuration for an engine instance.
///
/// Can be loaded from a TOML file via [`EngineConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default, so a
/// file only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Committee sizes, deadlines and fees.
    #[serde(default)]
    pub params: EngineParams,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ConsensusError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConsensusError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConsensusError> {
        let config: Self = toml::from_str(s).map_err(|e| ConsensusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("EngineConfig is always serializable to TOML")
    }

    /// Install the global log subscriber described by this configuration.
    pub fn init_logging(&self) -> Result<(), ConsensusError> {
        verdict_utils::try_init_logging(self.log_format, &self.log_level)
            .map_err(|e| ConsensusError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConsensusError> {
        let params = &self.params;
        if params.default_validator_count == 0 {
            return Err(ConsensusError::Config(
                "default_validator_count must be at least 1".into(),
            ));
        }
        if params.validators_per_round.contains(&0) {
            return Err(ConsensusError::Config(
                "validators_per_round entries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            params: EngineParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_roundtrip() {
        let config = EngineConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = EngineConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
log_format = "json"

[params]
leader_timeout_secs = 30
validator_fee = 7
"#;
        let config = EngineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.params.leader_timeout_secs, 30);
        assert_eq!(config.params.validator_fee, 7);
        assert_eq!(config.params.leader_fee, 100);
        assert_eq!(config.params.validators_for_round(1), 7);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\n[params]\nfinality_window_secs = 60").unwrap();
        let config = EngineConfig::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.params.finality_window_secs, 60);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let err = EngineConfig::from_toml_file("/nonexistent/verdict.toml").unwrap_err();
        assert!(matches!(err, ConsensusError::Config(_)));
    }

    #[test]
    fn zero_sized_committee_is_rejected() {
        let err = EngineConfig::from_toml_str("[params]\nvalidators_per_round = [5, 0]").unwrap_err();
        assert!(matches!(err, ConsensusError::Config(_)));
    }

    #[test]
    fn logging_installs_once() {
        let config = EngineConfig::default();
        let _ = config.init_logging();
        assert!(matches!(config.init_logging(), Err(ConsensusError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("log_format = [").unwrap_err();
        assert!(matches!(err, ConsensusError::Config(_)));
    }
}
