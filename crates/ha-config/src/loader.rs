//! YAML file loading

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the main configuration file inside a config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Load a YAML file relative to `config_dir`
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let path = config_dir.into().join(file);
    debug!("Loading YAML file: {:?}", path);

    let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
        path: path.clone(),
        source: e,
    })?;

    load_yaml_string(&content, &path)
}

/// Parse YAML content; `source_path` is only used in error messages
pub fn load_yaml_string(content: &str, source_path: &Path) -> ConfigResult<Value> {
    // An empty document is an empty mapping, not null
    if content.trim().is_empty() {
        return Ok(Value::Mapping(serde_yaml::Mapping::new()));
    }

    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
        path: source_path.to_path_buf(),
        source: e,
    })
}
