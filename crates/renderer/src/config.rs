use std::time::Duration;

use serde::{Deserialize, Serialize};

const MAX_CAPTURE_DELAY_MS: u64 = 60_000;

/// Settings shared by every async renderable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads are named `<prefix>-<n>`.
    pub worker_name_prefix: String,
    /// How long a woken worker waits before capturing the target view, so a
    /// burst of camera changes costs one query.
    pub query_state_capture_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_name_prefix: "async-renderable".to_string(),
            query_state_capture_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyWorkerName,
    InvalidWorkerName(String),
    CaptureDelayTooLong { ms: u64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyWorkerName => write!(f, "worker name prefix is empty"),
            ConfigError::InvalidWorkerName(name) => {
                write!(f, "worker name prefix {name:?} contains a NUL byte")
            }
            ConfigError::CaptureDelayTooLong { ms } => write!(
                f,
                "query state capture delay of {ms} ms exceeds {MAX_CAPTURE_DELAY_MS} ms"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_name_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyWorkerName);
        }
        if self.worker_name_prefix.contains('\0') {
            return Err(ConfigError::InvalidWorkerName(self.worker_name_prefix.clone()));
        }
        if self.query_state_capture_delay_ms > MAX_CAPTURE_DELAY_MS {
            return Err(ConfigError::CaptureDelayTooLong {
                ms: self.query_state_capture_delay_ms,
            });
        }
        Ok(())
    }

    pub fn query_state_capture_delay(&self) -> Duration {
        Duration::from_millis(self.query_state_capture_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.query_state_capture_delay(), Duration::ZERO);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "query_state_capture_delay_ms": 40 }"#).unwrap();
        assert_eq!(config.worker_name_prefix, "async-renderable");
        assert_eq!(config.query_state_capture_delay(), Duration::from_millis(40));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = EngineConfig {
            worker_name_prefix: "  ".into(),
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyWorkerName));
        config.worker_name_prefix = "a\0b".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWorkerName(_))));
        config.worker_name_prefix = "ok".into();
        config.query_state_capture_delay_ms = 120_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::CaptureDelayTooLong { ms: 120_000 })
        );
    }
}
