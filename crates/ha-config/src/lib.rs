//! YAML configuration loading for Home Assistant
//!
//! Reads `configuration.yaml` from a config directory and extracts the
//! `homeassistant:` section that configures the core: location name, timer
//! cadence and default log level.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::CoreConfig;
//!
//! let config = CoreConfig::load("/config")?;
//! assert_eq!(60 % config.timer_interval, 0);
//! ```

mod core_config;
mod error;
mod loader;

pub use core_config::CoreConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, CONFIG_FILE};
