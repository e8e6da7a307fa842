// tests/discovery.rs

mod common;
use crate::common::FakeTransport;
use crate::common::builders::{TopicConfigBuilder, multi_sensor, sensor, trigger};

use std::error::Error;
use std::time::Duration;

use serde_json::Value;

use mqtt_executor::discovery::{DEFAULT_TOPIC_PREFIX, DiscoveryPublisher, friendly_name};
use mqtt_executor::types::QoS;

type TestResult = Result<(), Box<dyn Error>>;

fn publisher() -> DiscoveryPublisher {
    DiscoveryPublisher::new("My NAS", "nas", DEFAULT_TOPIC_PREFIX)
}

#[test]
fn friendly_name_replaces_spaces() {
    assert_eq!(friendly_name("Disk used"), "Disk_used");
    assert_eq!(friendly_name("load"), "load");
}

#[test]
fn messages_cover_every_entity_in_order() -> TestResult {
    let cfg = TopicConfigBuilder::new()
        .with_availability("tele/nas/status")
        .with_sensor(sensor("Load", "tele/nas/load", Duration::from_secs(30), "true", &[]))
        .with_multi_sensor(multi_sensor(
            "tele/nas/disk",
            Duration::from_secs(60),
            "true",
            &[],
            &[("Disk used", "{{ value_json.used }}")],
        ))
        .with_trigger(trigger("Backup now", "cmnd/nas/backup", "true", &[]))
        .build();

    let topics: Vec<String> = publisher()
        .messages(&cfg)?
        .into_iter()
        .map(|m| m.topic)
        .collect();

    assert_eq!(
        topics,
        vec![
            "homeassistant/sensor/nas_status/config",
            "homeassistant/sensor/nas_Load/config",
            "homeassistant/sensor/nas_Disk_used/config",
            "homeassistant/switch/nas/Backup_now/config",
        ]
    );
    Ok(())
}

#[test]
fn trigger_becomes_switch() -> TestResult {
    let cfg = TopicConfigBuilder::new()
        .with_availability("tele/nas/status")
        .with_trigger(trigger("backup", "cmnd/nas/backup", "true", &[]))
        .build();

    let messages = publisher().messages(&cfg)?;
    let switch: Value = serde_json::from_str(&messages[1].payload)?;

    assert_eq!(switch["name"], "backup");
    assert_eq!(switch["uniq_id"], "nas_backup");
    assert_eq!(switch["cmd_t"], "cmnd/nas/backup");
    assert_eq!(switch["stat_t"], "cmnd/nas/backup/STATE");
    assert_eq!(switch["pl_on"], "START");
    assert_eq!(switch["pl_off"], "STOP");
    assert_eq!(switch["stat_on"], "RUNNING");
    assert_eq!(switch["stat_off"], "STOPPED");
    assert_eq!(switch["avty_t"], "tele/nas/status");
    assert_eq!(switch["pl_avail"], "Online");
    assert_eq!(switch["pl_not_avail"], "Offline");
    assert_eq!(switch["dev"]["ids"][0], "nas");
    assert!(switch.get("ic").is_none());
    Ok(())
}

#[test]
fn status_sensor_carries_device_details() -> TestResult {
    let cfg = TopicConfigBuilder::new()
        .with_availability("tele/nas/status")
        .build();

    let messages = publisher().messages(&cfg)?;
    assert_eq!(messages.len(), 1);

    let status: Value = serde_json::from_str(&messages[0].payload)?;
    assert_eq!(status["stat_t"], "tele/nas/status");
    assert_eq!(status["uniq_id"], "nas_status");
    assert_eq!(status["dev"]["name"], "My NAS");
    assert!(status.get("avty_t").is_none());
    Ok(())
}

#[test]
fn multi_sensor_value_uses_template() -> TestResult {
    let cfg = TopicConfigBuilder::new()
        .with_multi_sensor(multi_sensor(
            "tele/nas/disk",
            Duration::from_secs(60),
            "true",
            &[],
            &[("Disk used", "{{ value_json.used }}")],
        ))
        .build();

    let messages = publisher().messages(&cfg)?;
    let value: Value = serde_json::from_str(&messages[0].payload)?;

    assert_eq!(value["val_tpl"], "{{ value_json.used }}");
    assert_eq!(value["stat_t"], "tele/nas/disk");
    assert_eq!(value["frc_upd"], true);
    assert!(value.get("avty_t").is_none());
    Ok(())
}

#[tokio::test]
async fn publish_sends_every_message_unretained() -> TestResult {
    let cfg = TopicConfigBuilder::new()
        .with_availability("tele/nas/status")
        .with_trigger(trigger("backup", "cmnd/nas/backup", "true", &[]))
        .build();
    let transport = FakeTransport::new();

    DiscoveryPublisher::new("nas", "nas", "ha/")
        .publish(&*transport, &cfg)
        .await?;

    let published = transport.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, "ha/sensor/nas_status/config");
    assert!(published.iter().all(|p| !p.retain && p.qos == QoS::AtMostOnce));
    Ok(())
}
