use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuiesceConfig {
    #[serde(default)]
    pub barrier: BarrierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Applied by the untimed wait calls. Absent means wait forever.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    #[serde(default = "default_pump_capacity")]
    pub pump_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

fn default_pump_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_with_target() -> bool {
    true
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: None,
            pump_capacity: default_pump_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: default_with_target(),
        }
    }
}

impl BarrierConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

impl QuiesceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: QuiesceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.barrier.wait_timeout_ms == Some(0) {
            return Err(ConfigError::validation(
                "barrier.wait_timeout_ms must be greater than zero; omit it to wait forever",
            ));
        }
        if self.barrier.pump_capacity == 0 {
            return Err(ConfigError::validation(
                "barrier.pump_capacity must be greater than zero",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level must not be empty"));
        }
        Ok(())
    }
}
