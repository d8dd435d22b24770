//! Core Home Assistant configuration
//!
//! Parses the `homeassistant:` section from configuration.yaml

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::{load_yaml, CONFIG_FILE};

/// Core Home Assistant configuration from the `homeassistant:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Name of the location (e.g., "Home")
    #[serde(default = "default_name")]
    pub name: String,

    /// Seconds between timer ticks; must divide 60
    #[serde(default = "default_timer_interval")]
    pub timer_interval: u32,

    /// Milliseconds the timer sleeps between clock samples
    #[serde(default = "default_timer_resolution_ms")]
    pub timer_resolution_ms: u64,

    /// Default log filter directive (e.g., "info" or "ha_event_bus=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "Home".to_string()
}

fn default_timer_interval() -> u32 {
    10
}

fn default_timer_resolution_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            timer_interval: default_timer_interval(),
            timer_resolution_ms: default_timer_resolution_ms(),
            log_level: default_log_level(),
        }
    }
}

impl CoreConfig {
    /// Load core configuration from a config directory
    ///
    /// A directory without configuration.yaml yields the defaults.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    /// Parse core configuration from YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        // Get the homeassistant section, or use defaults
        let ha_section = match mapping.get(&Value::String("homeassistant".to_string())) {
            None | Some(Value::Null) => Value::Mapping(serde_yaml::Mapping::new()),
            Some(section) => section.clone(),
        };

        let config: CoreConfig = serde_yaml::from_value(ha_section).map_err(|e| {
            ConfigError::InvalidValue {
                key: "homeassistant".to_string(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timer_interval == 0 || 60 % self.timer_interval != 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer_interval".to_string(),
                reason: format!("{} does not divide 60", self.timer_interval),
            });
        }
        if self.timer_resolution_ms == 0 || self.timer_resolution_ms > 1000 {
            return Err(ConfigError::InvalidValue {
                key: "timer_resolution_ms".to_string(),
                reason: format!("{} is not between 1 and 1000", self.timer_resolution_ms),
            });
        }
        Ok(())
    }

    /// Timer sleep slice as a Duration
    pub fn timer_resolution(&self) -> Duration {
        Duration::from_millis(self.timer_resolution_ms)
    }
}
