// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawTopicConfig, TopicConfig};
use crate::errors::{ExecutorError, Result};

/// Load a topic configuration file and return the raw `RawTopicConfig`.
///
/// Files ending in `.toml` are parsed as TOML, everything else as JSON.
/// This only performs deserialization; use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawTopicConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    if contents.trim().is_empty() {
        return Err(ExecutorError::ConfigError(format!(
            "topic configuration file '{}' is empty",
            path.display()
        )));
    }

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let config: RawTopicConfig = if is_toml {
        toml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };

    debug!(
        path = %path.display(),
        triggers = config.trigger.len(),
        sensors = config.sensor.len(),
        multi_sensors = config.multi_sensor.len(),
        "topic configuration parsed"
    );

    Ok(config)
}

/// Load a topic configuration, validate it and substitute the device id.
///
/// - Reads JSON or TOML.
/// - Checks topic names, name uniqueness, intervals and commands.
/// - Fills in default availability payloads.
/// - Replaces `__DEVICE_ID__` in every topic with `device_id`.
pub fn load_and_validate(path: impl AsRef<Path>, device_id: &str) -> Result<TopicConfig> {
    let raw = load_from_path(&path)?;
    let config = TopicConfig::try_from(raw)?;
    Ok(config.with_device_id(device_id))
}

/// Default location of the topic configuration file.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("./config.json")
}
