// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    CommandConfig, MultiSensorConfig, RawTopicConfig, SensorConfig, TopicConfig, TriggerConfig,
};
use crate::errors::{ExecutorError, Result};

static TOPIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_/]*$").expect("topic regex is valid"));

impl TryFrom<RawTopicConfig> for TopicConfig {
    type Error = ExecutorError;

    fn try_from(raw: RawTopicConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(TopicConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawTopicConfig) -> Result<()> {
    validate_availability(cfg)?;
    validate_sensors(cfg)?;
    validate_triggers(cfg)?;
    Ok(())
}

fn validate_availability(cfg: &RawTopicConfig) -> Result<()> {
    if let Some(ref availability) = cfg.availability {
        check_topic_name(&availability.topic)
            .map_err(|e| config_error(format!("invalid availability topic: {e}")))?;

        if availability.interval == Some(Duration::ZERO) {
            return Err(config_error(
                "invalid availability interval: must be greater than zero".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_sensors(cfg: &RawTopicConfig) -> Result<()> {
    let mut names = HashSet::new();

    for (i, sensor) in cfg.sensor.iter().enumerate() {
        validate_sensor(sensor).map_err(|e| config_error(format!("invalid sensor (#{i}): {e}")))?;

        if !names.insert(sensor.name.as_str()) {
            return Err(config_error(format!(
                "invalid sensor (#{i}): sensor with name '{}' already exists",
                sensor.name
            )));
        }
    }

    for (i, sensor) in cfg.multi_sensor.iter().enumerate() {
        validate_multi_sensor(sensor)
            .map_err(|e| config_error(format!("invalid multi sensor (#{i}): {e}")))?;

        for value in sensor.values.iter() {
            if !names.insert(value.name.as_str()) {
                return Err(config_error(format!(
                    "invalid multi sensor (#{i}): sensor with name '{}' already exists",
                    value.name
                )));
            }
        }
    }

    Ok(())
}

fn validate_triggers(cfg: &RawTopicConfig) -> Result<()> {
    let mut names = HashSet::new();

    for (i, trigger) in cfg.trigger.iter().enumerate() {
        validate_trigger(trigger)
            .map_err(|e| config_error(format!("invalid trigger (#{i}): {e}")))?;

        if !names.insert(trigger.name.as_str()) {
            return Err(config_error(format!(
                "invalid trigger (#{i}): trigger with name '{}' already exists",
                trigger.name
            )));
        }
    }

    Ok(())
}

fn validate_sensor(sensor: &SensorConfig) -> std::result::Result<(), String> {
    if sensor.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    check_interval(sensor.interval)?;
    check_topic_name(&sensor.topic).map_err(|e| format!("invalid topic: {e}"))?;
    check_command(&sensor.command)
}

fn validate_multi_sensor(sensor: &MultiSensorConfig) -> std::result::Result<(), String> {
    for value in sensor.values.iter() {
        if value.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if value.template.trim().is_empty() {
            return Err("template must not be empty".to_string());
        }
    }
    check_interval(sensor.interval)?;
    check_topic_name(&sensor.topic).map_err(|e| format!("invalid topic: {e}"))?;
    check_command(&sensor.command)
}

fn validate_trigger(trigger: &TriggerConfig) -> std::result::Result<(), String> {
    if trigger.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    check_topic_name(&trigger.topic).map_err(|e| format!("invalid topic: {e}"))?;
    check_command(&trigger.command)
}

fn check_interval(interval: Duration) -> std::result::Result<(), String> {
    if interval.is_zero() {
        return Err("invalid duration: interval must be greater than zero".to_string());
    }
    Ok(())
}

fn check_command(command: &CommandConfig) -> std::result::Result<(), String> {
    if command.name.trim().is_empty() {
        return Err("command name must not be empty".to_string());
    }
    Ok(())
}

/// Topics may only contain ASCII letters, digits, `_` and `/`.
///
/// This rules out the MQTT wildcards `+` and `#`, which would turn a trigger
/// subscription into a pattern.
pub fn check_topic_name(topic: &str) -> std::result::Result<(), String> {
    if topic.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if !TOPIC_REGEX.is_match(topic) {
        return Err("invalid character".to_string());
    }
    Ok(())
}

fn config_error(msg: String) -> ExecutorError {
    ExecutorError::ConfigError(msg)
}
