//! Session configuration.

use crate::{error::ConfigError, retry::RetryConfig};
use logcodec_stream::{Commitment, DEFAULT_LOG_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Program whose logs are decoded (base58 public key)
    pub program_id: String,
    #[serde(default)]
    pub commitment: Commitment,
    /// Marker in front of emitted event data
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Use this instance instead of asking the authoritative source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_override: Option<u64>,
    /// Capacity of the event and change broadcast channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_log_prefix() -> String {
    DEFAULT_LOG_PREFIX.to_string()
}

fn default_channel_capacity() -> usize {
    1_024
}

impl SessionConfig {
    /// Defaults for everything but the program id.
    pub fn new(program_id: impl Into<String>) -> Self {
        Self {
            program_id: program_id.into(),
            commitment: Commitment::default(),
            log_prefix: default_log_prefix(),
            instance_override: None,
            channel_capacity: default_channel_capacity(),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or YAML for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = bs58::decode(&self.program_id)
            .into_vec()
            .map_err(|e| ConfigError::Invalid {
                field: "program_id",
                reason: e.to_string(),
            })?;
        if key.len() != 32 {
            return Err(ConfigError::Invalid {
                field: "program_id",
                reason: format!("expected 32 bytes, got {}", key.len()),
            });
        }
        if self.log_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_prefix",
                reason: "must not be empty".into(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PROGRAM: &str = "3YdayPtujByJ1g1DWEUh7vpg78gZL49FWyD5rDGyof9T";

    #[test]
    fn yaml_with_defaults() {
        let config = SessionConfig::from_yaml_str(&format!("program_id: {PROGRAM}\n")).unwrap();
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.log_prefix, "Program data: ");
        assert_eq!(config.channel_capacity, 1_024);
        assert!(config.instance_override.is_none());
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn json_overrides() {
        let json = format!(
            r#"{{"program_id": "{PROGRAM}", "commitment": "finalized", "instance_override": 7,
                "retry": {{"max_retries": 1, "initial_backoff_ms": 5}}}}"#
        );
        let config = SessionConfig::from_json_str(&json).unwrap();
        assert_eq!(config.commitment, Commitment::Finalized);
        assert_eq!(config.instance_override, Some(7));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(5));
    }

    #[test]
    fn rejects_bad_program_id() {
        let err = SessionConfig::from_yaml_str("program_id: not-base58!\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "program_id", .. }));
        let err = SessionConfig::new("abc").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "program_id", .. }));
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = SessionConfig::new(PROGRAM);
        config.channel_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "channel_capacity", .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SessionConfig::from_file(Path::new("/nonexistent/session.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
