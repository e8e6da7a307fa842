// src/logging.rs

//! Logging setup: a `tracing-subscriber` registry with an [`EnvFilter`] and a
//! fmt layer on stderr.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to everything except the MQTT client, which is
//!    held at `warn` unless tracing is requested;
//! 2. `MQTT_EXECUTOR_LOG`, taken as full filter directives
//!    (`debug`, `mqtt_executor=debug,rumqttc=info`, ...);
//! 3. [`DEFAULT_DIRECTIVES`].

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "MQTT_EXECUTOR_LOG";

/// rumqttc logs every reconnect attempt at `info` and above.
pub const DEFAULT_DIRECTIVES: &str = "info,rumqttc=warn";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let directives = filter_directives(cli_level, env.as_deref());

    let (filter, rejected) = match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_DIRECTIVES), Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .context("failed to install log subscriber")?;

    if let Some(e) = rejected {
        tracing::warn!(%directives, error = %e, "ignoring invalid {LOG_ENV_VAR}");
    }
    Ok(())
}

/// Filter directives for the given flag and `MQTT_EXECUTOR_LOG` value.
pub fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return match level {
            LogLevel::Trace => "trace".to_string(),
            other => format!("{},rumqttc=warn", level_name(other)),
        };
    }

    match env.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => DEFAULT_DIRECTIVES.to_string(),
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
