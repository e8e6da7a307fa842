// src/config/mod.rs

//! Topic configuration loading and validation.
//!
//! - `model.rs`: the serde data model (triggers, sensors, availability).
//! - `loader.rs`: reading JSON / TOML from disk and device-id templating.
//! - `validate.rs`: topic, name, interval and command checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    AvailabilityConfig, AvailabilityPayload, CommandConfig, MultiSensorConfig, MultiSensorValue,
    RawTopicConfig, SensorConfig, SensorSpec, TopicConfig, TriggerConfig,
};
pub use validate::check_topic_name;
