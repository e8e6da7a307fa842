// src/discovery.rs

//! Home Assistant MQTT discovery.
//!
//! Publishes one discovery config per availability topic, sensor,
//! multi-sensor value and trigger so the dashboard creates matching
//! entities. Triggers become switches: `START`/`STOP` as on/off commands and
//! `RUNNING`/`STOPPED` as on/off states.

use serde::Serialize;
use tracing::info;

use crate::bridge::trigger::{
    PAYLOAD_START, PAYLOAD_STATUS_RUNNING, PAYLOAD_STATUS_STOPPED, PAYLOAD_STOP, state_topic,
};
use crate::config::{
    AvailabilityConfig, MultiSensorConfig, MultiSensorValue, SensorConfig, TopicConfig,
    TriggerConfig,
};
use crate::errors::Result;
use crate::transport::{Transport, publish_and_forget};
use crate::types::QoS;

pub const DEFAULT_TOPIC_PREFIX: &str = "homeassistant/";

#[derive(Debug, Clone, Serialize)]
struct GeneralConfig {
    name: String,
    #[serde(rename = "avty_t", skip_serializing_if = "Option::is_none")]
    availability_topic: Option<String>,
    #[serde(rename = "pl_avail", skip_serializing_if = "Option::is_none")]
    payload_available: Option<String>,
    #[serde(rename = "pl_not_avail", skip_serializing_if = "Option::is_none")]
    payload_not_available: Option<String>,
    #[serde(rename = "uniq_id")]
    unique_id: String,
    #[serde(rename = "dev", skip_serializing_if = "Option::is_none")]
    device: Option<Device>,
}

#[derive(Debug, Clone, Serialize)]
struct SensorDiscovery {
    #[serde(flatten)]
    general: GeneralConfig,
    #[serde(rename = "stat_t")]
    state_topic: String,
    #[serde(rename = "unit_of_meas", skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(rename = "ic", skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(rename = "val_tpl", skip_serializing_if = "Option::is_none")]
    value_template: Option<String>,
    #[serde(rename = "frc_upd", skip_serializing_if = "Option::is_none")]
    force_update: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct SwitchDiscovery {
    #[serde(flatten)]
    general: GeneralConfig,
    #[serde(rename = "cmd_t")]
    command_topic: String,
    #[serde(rename = "stat_t")]
    state_topic: String,
    #[serde(rename = "pl_on")]
    payload_start: &'static str,
    #[serde(rename = "pl_off")]
    payload_stop: &'static str,
    #[serde(rename = "stat_on")]
    state_running: &'static str,
    #[serde(rename = "stat_off")]
    state_stopped: &'static str,
    #[serde(rename = "ic", skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    ids: Vec<String>,
    #[serde(rename = "mdl", skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(rename = "mf", skip_serializing_if = "Option::is_none")]
    manufacturer: Option<String>,
    #[serde(rename = "sw", skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// One discovery message, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: String,
}

/// Builds discovery messages for one device.
#[derive(Debug, Clone)]
pub struct DiscoveryPublisher {
    pub device_name: String,
    pub device_id: String,
    pub topic_prefix: String,
}

/// Spaces are not allowed in discovery object ids.
pub fn friendly_name(name: &str) -> String {
    name.replace(' ', "_")
}

impl DiscoveryPublisher {
    pub fn new(
        device_name: impl Into<String>,
        device_id: impl Into<String>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            device_id: device_id.into(),
            topic_prefix: topic_prefix.into(),
        }
    }

    /// Every discovery message for `config`, availability first.
    pub fn messages(&self, config: &TopicConfig) -> Result<Vec<DiscoveryMessage>> {
        let availability = config.availability();
        let mut messages = Vec::new();

        if let Some(a) = availability {
            messages.push(DiscoveryMessage {
                topic: format!("{}sensor/{}_status/config", self.topic_prefix, self.device_id),
                payload: serde_json::to_string(&self.status_payload(a))?,
            });
        }

        for sensor in config.sensors() {
            messages.push(DiscoveryMessage {
                topic: self.sensor_topic(&sensor.name),
                payload: serde_json::to_string(&self.sensor_payload(availability, sensor))?,
            });
        }

        for multi in config.multi_sensors() {
            for value in multi.values.iter() {
                messages.push(DiscoveryMessage {
                    topic: self.sensor_topic(&value.name),
                    payload: serde_json::to_string(
                        &self.multi_sensor_payload(availability, multi, value),
                    )?,
                });
            }
        }

        for trigger in config.triggers() {
            messages.push(DiscoveryMessage {
                topic: format!(
                    "{}switch/{}/{}/config",
                    self.topic_prefix,
                    self.device_id,
                    friendly_name(&trigger.name)
                ),
                payload: serde_json::to_string(&self.trigger_payload(availability, trigger))?,
            });
        }

        Ok(messages)
    }

    /// Publish every discovery message (QoS 0, not retained).
    pub async fn publish<T: Transport + ?Sized>(
        &self,
        transport: &T,
        config: &TopicConfig,
    ) -> Result<()> {
        info!(prefix = %self.topic_prefix, "publishing home assistant discovery config");

        for message in self.messages(config)? {
            publish_and_forget(transport, &message.topic, QoS::AtMostOnce, false, message.payload)
                .await;
        }
        Ok(())
    }

    fn sensor_topic(&self, name: &str) -> String {
        format!(
            "{}sensor/{}_{}/config",
            self.topic_prefix,
            self.device_id,
            friendly_name(name)
        )
    }

    fn unique_id(&self, name: &str) -> String {
        format!("{}_{}", self.device_id, friendly_name(name))
    }

    fn device_ref(&self) -> Device {
        Device {
            name: None,
            ids: vec![self.device_id.clone()],
            model: None,
            manufacturer: None,
            version: None,
        }
    }

    fn general(&self, name: &str, availability: Option<&AvailabilityConfig>) -> GeneralConfig {
        GeneralConfig {
            name: name.to_string(),
            availability_topic: availability.map(|a| a.topic.clone()),
            payload_available: availability.map(|a| a.payload.available.clone()),
            payload_not_available: availability.map(|a| a.payload.unavailable.clone()),
            unique_id: self.unique_id(name),
            device: Some(self.device_ref()),
        }
    }

    fn status_payload(&self, availability: &AvailabilityConfig) -> SensorDiscovery {
        SensorDiscovery {
            general: GeneralConfig {
                name: "Status".to_string(),
                availability_topic: None,
                payload_available: Some(availability.payload.available.clone()),
                payload_not_available: Some(availability.payload.unavailable.clone()),
                unique_id: format!("{}_status", self.device_id),
                device: Some(Device {
                    name: Some(self.device_name.clone()),
                    ids: vec![self.device_id.clone()],
                    model: Some(std::env::consts::OS.to_string()),
                    manufacturer: Some(env!("CARGO_PKG_NAME").to_string()),
                    version: Some(format!(
                        "{} {}",
                        env!("CARGO_PKG_NAME"),
                        env!("CARGO_PKG_VERSION")
                    )),
                }),
            },
            state_topic: availability.topic.clone(),
            unit: None,
            icon: None,
            value_template: None,
            force_update: None,
        }
    }

    fn sensor_payload(
        &self,
        availability: Option<&AvailabilityConfig>,
        sensor: &SensorConfig,
    ) -> SensorDiscovery {
        SensorDiscovery {
            general: self.general(&sensor.name, availability),
            state_topic: sensor.topic.clone(),
            unit: sensor.unit.clone(),
            icon: sensor.icon.clone(),
            value_template: None,
            force_update: Some(true),
        }
    }

    fn multi_sensor_payload(
        &self,
        availability: Option<&AvailabilityConfig>,
        multi: &MultiSensorConfig,
        value: &MultiSensorValue,
    ) -> SensorDiscovery {
        SensorDiscovery {
            general: self.general(&value.name, availability),
            state_topic: multi.topic.clone(),
            unit: value.unit.clone(),
            icon: value.icon.clone(),
            value_template: Some(value.template.clone()),
            force_update: Some(true),
        }
    }

    fn trigger_payload(
        &self,
        availability: Option<&AvailabilityConfig>,
        trigger: &TriggerConfig,
    ) -> SwitchDiscovery {
        SwitchDiscovery {
            general: self.general(&trigger.name, availability),
            command_topic: trigger.topic.clone(),
            state_topic: state_topic(&trigger.topic),
            payload_start: PAYLOAD_START,
            payload_stop: PAYLOAD_STOP,
            state_running: PAYLOAD_STATUS_RUNNING,
            state_stopped: PAYLOAD_STATUS_STOPPED,
            icon: trigger.icon.clone(),
        }
    }
}
