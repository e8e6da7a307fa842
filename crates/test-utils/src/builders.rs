#![allow(dead_code)]

use std::time::Duration;

use mqtt_executor::config::{
    AvailabilityConfig, AvailabilityPayload, CommandConfig, MultiSensorConfig, MultiSensorValue,
    RawTopicConfig, SensorConfig, SensorSpec, TopicConfig, TriggerConfig,
};

/// Builder for `TopicConfig` to simplify test setup.
pub struct TopicConfigBuilder {
    config: RawTopicConfig,
}

impl TopicConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawTopicConfig::default(),
        }
    }

    pub fn with_availability(mut self, topic: &str) -> Self {
        self.config.availability = Some(AvailabilityConfig {
            topic: topic.to_string(),
            payload: AvailabilityPayload::default(),
            interval: None,
        });
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.config.trigger.push(trigger);
        self
    }

    pub fn with_sensor(mut self, sensor: SensorConfig) -> Self {
        self.config.sensor.push(sensor);
        self
    }

    pub fn with_multi_sensor(mut self, sensor: MultiSensorConfig) -> Self {
        self.config.multi_sensor.push(sensor);
        self
    }

    pub fn raw(self) -> RawTopicConfig {
        self.config
    }

    pub fn build(self) -> TopicConfig {
        TopicConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for TopicConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn trigger(name: &str, topic: &str, program: &str, args: &[&str]) -> TriggerConfig {
    TriggerConfig {
        name: name.to_string(),
        topic: topic.to_string(),
        icon: None,
        command: CommandConfig::new(program, args),
    }
}

pub fn sensor(
    name: &str,
    topic: &str,
    interval: Duration,
    program: &str,
    args: &[&str],
) -> SensorConfig {
    SensorConfig {
        name: name.to_string(),
        topic: topic.to_string(),
        retained: false,
        interval,
        unit: None,
        icon: None,
        command: CommandConfig::new(program, args),
    }
}

pub fn multi_sensor(
    topic: &str,
    interval: Duration,
    program: &str,
    args: &[&str],
    values: &[(&str, &str)],
) -> MultiSensorConfig {
    MultiSensorConfig {
        topic: topic.to_string(),
        retained: false,
        interval,
        command: CommandConfig::new(program, args),
        values: values
            .iter()
            .map(|(name, template)| MultiSensorValue {
                name: name.to_string(),
                template: template.to_string(),
                unit: None,
                icon: None,
            })
            .collect(),
    }
}

pub fn sensor_spec(
    name: &str,
    topic: &str,
    interval: Duration,
    program: &str,
    args: &[&str],
) -> SensorSpec {
    SensorSpec {
        name: name.to_string(),
        topic: topic.to_string(),
        retained: false,
        interval,
        command: CommandConfig::new(program, args),
    }
}
