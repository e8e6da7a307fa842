// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Placeholder that may appear in any configured topic and is replaced with
/// the `--device-id` value after validation.
pub const DEVICE_ID_PLACEHOLDER: &str = "__DEVICE_ID__";

pub const DEFAULT_PAYLOAD_AVAILABLE: &str = "Online";
pub const DEFAULT_PAYLOAD_UNAVAILABLE: &str = "Offline";

/// Topic configuration as read from disk, before validation.
///
/// ```json
/// {
///   "availability": { "topic": "tele/__DEVICE_ID__/status" },
///   "trigger": [{
///     "name": "Backup",
///     "topic": "cmnd/__DEVICE_ID__/backup",
///     "command": { "name": "/usr/bin/backup", "arguments": ["--full"] }
///   }],
///   "sensor": [{
///     "name": "Load",
///     "topic": "tele/__DEVICE_ID__/load",
///     "interval": "30s",
///     "command": { "name": "cat", "arguments": ["/proc/loadavg"] }
///   }]
/// }
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTopicConfig {
    #[serde(default)]
    pub availability: Option<AvailabilityConfig>,

    #[serde(default)]
    pub trigger: Vec<TriggerConfig>,

    #[serde(default)]
    pub sensor: Vec<SensorConfig>,

    #[serde(default)]
    pub multi_sensor: Vec<MultiSensorConfig>,
}

/// Validated topic configuration.
///
/// Only obtainable through `TryFrom<RawTopicConfig>` (see `validate.rs`), so
/// holding one means names are unique, topics are well-formed and intervals
/// are non-zero.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    availability: Option<AvailabilityConfig>,
    trigger: Vec<TriggerConfig>,
    sensor: Vec<SensorConfig>,
    multi_sensor: Vec<MultiSensorConfig>,
}

impl TopicConfig {
    pub(crate) fn new_unchecked(raw: RawTopicConfig) -> Self {
        let mut availability = raw.availability;
        if let Some(ref mut a) = availability {
            if a.payload.available.is_empty() {
                a.payload.available = DEFAULT_PAYLOAD_AVAILABLE.to_string();
            }
            if a.payload.unavailable.is_empty() {
                a.payload.unavailable = DEFAULT_PAYLOAD_UNAVAILABLE.to_string();
            }
        }

        Self {
            availability,
            trigger: raw.trigger,
            sensor: raw.sensor,
            multi_sensor: raw.multi_sensor,
        }
    }

    /// Replace [`DEVICE_ID_PLACEHOLDER`] in every topic.
    pub fn with_device_id(mut self, device_id: &str) -> Self {
        let replace = |topic: &mut String| {
            if topic.contains(DEVICE_ID_PLACEHOLDER) {
                *topic = topic.replace(DEVICE_ID_PLACEHOLDER, device_id);
            }
        };

        if let Some(ref mut a) = self.availability {
            replace(&mut a.topic);
        }
        self.trigger.iter_mut().for_each(|t| replace(&mut t.topic));
        self.sensor.iter_mut().for_each(|s| replace(&mut s.topic));
        self.multi_sensor.iter_mut().for_each(|s| replace(&mut s.topic));
        self
    }

    pub fn availability(&self) -> Option<&AvailabilityConfig> {
        self.availability.as_ref()
    }

    pub fn triggers(&self) -> &[TriggerConfig] {
        &self.trigger
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensor
    }

    pub fn multi_sensors(&self) -> &[MultiSensorConfig] {
        &self.multi_sensor
    }

    /// Every polled command, plain sensors first, then multi-sensors.
    pub fn sensor_specs(&self) -> Vec<SensorSpec> {
        let plain = self.sensor.iter().map(|s| SensorSpec {
            name: s.name.clone(),
            topic: s.topic.clone(),
            retained: s.retained,
            interval: s.interval,
            command: s.command.clone(),
        });

        let multi = self.multi_sensor.iter().map(|s| SensorSpec {
            name: s.display_name(),
            topic: s.topic.clone(),
            retained: s.retained,
            interval: s.interval,
            command: s.command.clone(),
        });

        plain.chain(multi).collect()
    }
}

/// An external command: program plus argument list. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    pub name: String,

    #[serde(default)]
    pub arguments: Vec<String>,
}

impl CommandConfig {
    pub fn new(name: impl Into<String>, arguments: &[&str]) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// `availability` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityConfig {
    pub topic: String,

    /// Missing payloads default to `Online` / `Offline`.
    #[serde(default)]
    pub payload: AvailabilityPayload,

    /// If set, the "available" payload is republished on this interval.
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityPayload {
    #[serde(default)]
    pub available: String,

    #[serde(default)]
    pub unavailable: String,
}

/// One `trigger` entry: a command that can be started and stopped by
/// publishing `START` / `STOP` to `topic`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub topic: String,

    /// Only used for Home Assistant discovery.
    #[serde(default)]
    pub icon: Option<String>,

    pub command: CommandConfig,
}

/// One `sensor` entry: a command polled on `interval` whose output is
/// published to `topic`.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub topic: String,

    #[serde(default)]
    pub retained: bool,

    /// Duration string such as `"30s"` or `"5m"`.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    pub command: CommandConfig,
}

/// One `multi_sensor` entry: a single polled command whose output feeds
/// several dashboard values, each extracted with its own template.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiSensorConfig {
    pub topic: String,

    #[serde(default)]
    pub retained: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    pub command: CommandConfig,

    #[serde(default)]
    pub values: Vec<MultiSensorValue>,
}

impl MultiSensorConfig {
    fn display_name(&self) -> String {
        if self.values.is_empty() {
            return self.topic.clone();
        }
        self.values
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiSensorValue {
    pub name: String,

    /// Dashboard value template, e.g. `{{ value_json.temperature }}`.
    pub template: String,

    #[serde(default)]
    pub unit: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,
}

/// Everything the sensor poller needs to run one polled command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub name: String,
    pub topic: String,
    pub retained: bool,
    pub interval: Duration,
    pub command: CommandConfig,
}
