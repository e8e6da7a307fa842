// src/lib.rs

pub mod bridge;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod signals;
pub mod transport;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{AvailabilityReporter, SensorPoller, ShutdownCoordinator, TriggerController};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{CommandConfig, TopicConfig};
use crate::discovery::DiscoveryPublisher;
use crate::exec::{ExecutionRegistry, ProcessRunner};
use crate::transport::{BrokerAddress, ConnectionEvent, MqttSettings, MqttTransport, Transport};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the broker connection
/// - availability, triggers and sensors
/// - signal handling and the shutdown sequence
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path, &args.device_id)?;

    if args.dry_run {
        print_dry_run(&args, &cfg);
        return Ok(());
    }

    let settings = MqttSettings {
        broker: BrokerAddress::parse(&args.broker)?,
        client_id: args.client_id.clone(),
        username: args.user.clone(),
        password: args.password.clone(),
        keep_alive: args.keep_alive,
        last_will: cfg
            .availability()
            .map(|a| (a.topic.clone(), a.payload.unavailable.clone())),
    };
    let (transport, connection_events) = MqttTransport::connect(settings).await?;

    let registry = ExecutionRegistry::new();
    let runner = ProcessRunner::new(Arc::clone(&registry));
    let mut coordinator = ShutdownCoordinator::new(args.shutdown_timeout);

    if args.home_assistant {
        DiscoveryPublisher::new(
            args.device_name(),
            args.device_id.clone(),
            args.home_assistant_topic.clone(),
        )
        .publish(&*transport, &cfg)
        .await?;
    }

    if let Some(availability) = cfg.availability() {
        let reporter = AvailabilityReporter::new(Arc::clone(&transport), availability.clone());
        reporter.start();
        coordinator.add(reporter);
    }

    let triggers = TriggerController::new(
        Arc::clone(&transport),
        runner.clone(),
        cfg.triggers().to_vec(),
        args.sub_qos,
        args.pub_qos,
    );
    triggers.initialise().await?;
    coordinator.add(triggers.clone());

    let sensors = SensorPoller::new(
        Arc::clone(&transport),
        runner,
        cfg.sensor_specs(),
        args.pub_qos,
    );
    sensors.start();
    coordinator.add(sensors);
    coordinator.add(registry);

    let events_task = spawn_connection_events(connection_events, Arc::clone(&triggers));

    info!("mqtt-executor is running");
    signals::wait_for_shutdown_signal()
        .await
        .context("failed to listen for shutdown signals")?;
    info!("shutdown signal received");

    let report = coordinator.shutdown(&*transport).await;
    events_task.abort();

    if report.is_clean() {
        info!("shutdown complete");
    } else {
        warn!(
            timed_out = report.timed_out.len(),
            disconnect_error = ?report.disconnect_error,
            "shutdown finished with errors"
        );
    }
    Ok(())
}

/// Forward connection events: re-subscribe triggers after a reconnect.
fn spawn_connection_events<T: Transport + 'static>(
    mut events: mpsc::Receiver<ConnectionEvent>,
    triggers: Arc<TriggerController<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConnectionEvent::Connected { reconnect: true } => {
                    info!("reconnected to broker");
                    triggers.on_reconnect().await;
                }
                ConnectionEvent::Connected { reconnect: false } => {
                    debug!("connected to broker");
                }
                ConnectionEvent::Lost(reason) => {
                    warn!(%reason, "connection to broker lost");
                }
            }
        }
    })
}

fn format_command(command: &CommandConfig) -> String {
    let mut parts = Vec::with_capacity(command.arguments.len() + 1);
    parts.push(command.name.as_str());
    parts.extend(command.arguments.iter().map(String::as_str));
    parts.join(" ")
}

/// Simple dry-run output: print the resolved topics and commands.
fn print_dry_run(args: &CliArgs, cfg: &TopicConfig) {
    println!("mqtt-executor dry-run");
    println!("  broker = {}", args.broker);
    println!("  device_id = {}", args.device_id);
    println!("  sub_qos = {}, pub_qos = {}", args.sub_qos, args.pub_qos);
    println!();

    match cfg.availability() {
        Some(a) => {
            println!("availability:");
            println!("  topic: {}", a.topic);
            println!(
                "  payload: available={:?} unavailable={:?}",
                a.payload.available, a.payload.unavailable
            );
            if let Some(interval) = a.interval {
                println!("  interval: {}", humantime::format_duration(interval));
            }
        }
        None => println!("availability: none"),
    }
    println!();

    println!("triggers ({}):", cfg.triggers().len());
    for trigger in cfg.triggers() {
        println!("  - {}", trigger.name);
        println!("      topic: {}", trigger.topic);
        println!("      cmd: {}", format_command(&trigger.command));
    }

    let sensors = cfg.sensor_specs();
    println!("sensors ({}):", sensors.len());
    for sensor in sensors.iter() {
        println!("  - {}", sensor.name);
        println!("      topic: {}", sensor.topic);
        println!("      interval: {}", humantime::format_duration(sensor.interval));
        if sensor.retained {
            println!("      retained: true");
        }
        println!("      cmd: {}", format_command(&sensor.command));
    }

    debug!("dry-run complete (no connection)");
}
