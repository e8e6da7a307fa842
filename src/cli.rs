// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::discovery::DEFAULT_TOPIC_PREFIX;
use crate::types::QoS;

/// Command-line arguments for `mqtt-executor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mqtt-executor",
    version,
    about = "Run local commands on MQTT messages and publish their results.",
    long_about = None
)]
pub struct CliArgs {
    /// The broker URI, e.g. `tcp://127.0.0.1:1883`.
    #[arg(long, value_name = "URI")]
    pub broker: String,

    /// Quality of service for subscriptions (0, 1 or 2).
    #[arg(long = "sub-qos", value_name = "QOS", default_value = "0")]
    pub sub_qos: QoS,

    /// Quality of service for published results (0, 1 or 2).
    #[arg(long = "pub-qos", value_name = "QOS", default_value = "0")]
    pub pub_qos: QoS,

    /// Broker user name.
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Broker password.
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    #[arg(long = "client-id", value_name = "ID", default_value = "mqtt-executor")]
    pub client_id: String,

    /// Path to the topic configuration file (JSON, or TOML if it ends in
    /// `.toml`).
    #[arg(long, value_name = "PATH", default_value = "./config.json")]
    pub config: String,

    /// Replaces `__DEVICE_ID__` in configured topics.
    #[arg(long = "device-id", value_name = "ID", default_value = "mqtt-executor")]
    pub device_id: String,

    /// Human readable device name for discovery. Defaults to the device id.
    #[arg(long = "device-name", value_name = "NAME")]
    pub device_name: Option<String>,

    /// Publish Home Assistant discovery configs on startup.
    #[arg(long = "home-assistant")]
    pub home_assistant: bool,

    /// Home Assistant discovery topic prefix.
    #[arg(long = "home-assistant-topic", value_name = "PREFIX", default_value = DEFAULT_TOPIC_PREFIX)]
    pub home_assistant_topic: String,

    /// How long each component may take to shut down (e.g. `20s`).
    #[arg(
        long = "shutdown-timeout",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "20s"
    )]
    pub shutdown_timeout: Duration,

    /// MQTT keep-alive interval (e.g. `30s`).
    #[arg(
        long = "keep-alive",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    pub keep_alive: Duration,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MQTT_EXECUTOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the configuration, print it, but don't connect.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    pub fn device_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.device_id)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
