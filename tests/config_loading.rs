// tests/config_loading.rs

mod common;
use crate::common::builders::{TopicConfigBuilder, multi_sensor, sensor, trigger};

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use mqtt_executor::config::{TopicConfig, load_and_validate, load_from_path};
use mqtt_executor::errors::ExecutorError;

type TestResult = Result<(), Box<dyn Error>>;

const JSON_CONFIG: &str = r#"{
  "availability": { "topic": "tele/__DEVICE_ID__/status" },
  "trigger": [{
    "name": "Backup",
    "topic": "cmnd/__DEVICE_ID__/backup",
    "icon": "mdi:backup-restore",
    "command": { "name": "/usr/bin/backup", "arguments": ["--full"] }
  }],
  "sensor": [{
    "name": "Load",
    "topic": "tele/__DEVICE_ID__/load",
    "retained": true,
    "interval": "30s",
    "unit": "%",
    "command": { "name": "cat", "arguments": ["/proc/loadavg"] }
  }],
  "multi_sensor": [{
    "topic": "tele/__DEVICE_ID__/disk",
    "interval": "5m",
    "command": { "name": "/usr/local/bin/disk-json" },
    "values": [
      { "name": "Disk used", "template": "{{ value_json.used }}", "unit": "GB" },
      { "name": "Disk free", "template": "{{ value_json.free }}", "unit": "GB" }
    ]
  }]
}"#;

fn write_config(dir: &TempDir, file: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, contents).expect("write config");
    path
}

fn config_error_message(err: ExecutorError) -> String {
    match err {
        ExecutorError::ConfigError(msg) => msg,
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn json_config_is_loaded_and_templated() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "config.json", JSON_CONFIG);

    let cfg = load_and_validate(&path, "nas")?;

    let availability = cfg.availability().expect("availability");
    assert_eq!(availability.topic, "tele/nas/status");
    assert_eq!(availability.payload.available, "Online");
    assert_eq!(availability.payload.unavailable, "Offline");
    assert_eq!(availability.interval, None);

    let backup = &cfg.triggers()[0];
    assert_eq!(backup.topic, "cmnd/nas/backup");
    assert_eq!(backup.command.name, "/usr/bin/backup");
    assert_eq!(backup.command.arguments, vec!["--full"]);
    assert_eq!(backup.icon.as_deref(), Some("mdi:backup-restore"));

    let load = &cfg.sensors()[0];
    assert_eq!(load.topic, "tele/nas/load");
    assert_eq!(load.interval, Duration::from_secs(30));
    assert!(load.retained);

    let disk = &cfg.multi_sensors()[0];
    assert_eq!(disk.topic, "tele/nas/disk");
    assert_eq!(disk.interval, Duration::from_secs(300));
    assert!(disk.command.arguments.is_empty());
    Ok(())
}

#[test]
fn sensor_specs_cover_plain_and_multi_sensors() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "config.json", JSON_CONFIG);
    let cfg = load_and_validate(&path, "nas")?;

    let specs = cfg.sensor_specs();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].name, "Load");
    assert_eq!(specs[0].topic, "tele/nas/load");
    assert_eq!(specs[1].name, "Disk used,Disk free");
    assert_eq!(specs[1].interval, Duration::from_secs(300));
    Ok(())
}

#[test]
fn toml_config_is_supported() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        "config.toml",
        r#"
[availability]
topic = "status"
interval = "1m"

[availability.payload]
available = "up"
unavailable = "down"

[[trigger]]
name = "reboot"
topic = "cmnd/reboot"
command = { name = "systemctl", arguments = ["reboot"] }
"#,
    );

    let cfg = load_and_validate(&path, "ignored")?;
    let availability = cfg.availability().expect("availability");
    assert_eq!(availability.payload.available, "up");
    assert_eq!(availability.payload.unavailable, "down");
    assert_eq!(availability.interval, Some(Duration::from_secs(60)));
    assert_eq!(cfg.triggers()[0].command.arguments, vec!["reboot"]);
    assert!(cfg.sensors().is_empty());
    Ok(())
}

#[test]
fn empty_file_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "config.json", "   \n");

    let msg = config_error_message(load_from_path(&path).unwrap_err());
    assert!(msg.contains("is empty"), "message: {msg}");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/definitely/not/here/config.json").unwrap_err();
    assert!(matches!(err, ExecutorError::IoError(_)));
}

#[test]
fn malformed_json_is_a_json_error() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "config.json", "{ \"trigger\": [ }");

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ExecutorError::JsonError(_)));
    Ok(())
}

#[test]
fn duplicate_trigger_names_are_rejected() {
    let raw = TopicConfigBuilder::new()
        .with_trigger(trigger("backup", "cmnd/a", "true", &[]))
        .with_trigger(trigger("backup", "cmnd/b", "true", &[]))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert_eq!(
        msg,
        "invalid trigger (#1): trigger with name 'backup' already exists"
    );
}

#[test]
fn sensor_and_multi_sensor_names_share_a_namespace() {
    let raw = TopicConfigBuilder::new()
        .with_sensor(sensor("Disk used", "tele/a", Duration::from_secs(1), "true", &[]))
        .with_multi_sensor(multi_sensor(
            "tele/b",
            Duration::from_secs(1),
            "true",
            &[],
            &[("Disk used", "{{ value }}")],
        ))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert!(msg.contains("already exists"), "message: {msg}");
}

#[test]
fn zero_interval_is_rejected() {
    let raw = TopicConfigBuilder::new()
        .with_sensor(sensor("load", "tele/load", Duration::ZERO, "true", &[]))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert_eq!(
        msg,
        "invalid sensor (#0): invalid duration: interval must be greater than zero"
    );
}

#[test]
fn wildcard_topics_are_rejected() {
    let raw = TopicConfigBuilder::new()
        .with_trigger(trigger("backup", "cmnd/+/backup", "true", &[]))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert_eq!(msg, "invalid trigger (#0): invalid topic: invalid character");
}

#[test]
fn empty_command_is_rejected() {
    let raw = TopicConfigBuilder::new()
        .with_trigger(trigger("backup", "cmnd/backup", "  ", &[]))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert_eq!(msg, "invalid trigger (#0): command name must not be empty");
}

#[test]
fn empty_multi_sensor_template_is_rejected() {
    let raw = TopicConfigBuilder::new()
        .with_multi_sensor(multi_sensor(
            "tele/disk",
            Duration::from_secs(1),
            "true",
            &[],
            &[("Disk used", "")],
        ))
        .raw();

    let msg = config_error_message(TopicConfig::try_from(raw).unwrap_err());
    assert_eq!(msg, "invalid multi sensor (#0): template must not be empty");
}

#[test]
fn builder_config_without_device_placeholder_is_unchanged() {
    let cfg = TopicConfigBuilder::new()
        .with_availability("status")
        .with_trigger(trigger("backup", "cmnd/backup", "true", &[]))
        .build()
        .with_device_id("nas");

    assert_eq!(cfg.availability().map(|a| a.topic.as_str()), Some("status"));
    assert_eq!(cfg.triggers()[0].topic, "cmnd/backup");
}
