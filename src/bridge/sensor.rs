// src/bridge/sensor.rs

//! Sensor poller: one timer loop per sensor.
//!
//! Each loop runs its command immediately, then once per interval, and
//! publishes the output to the sensor's topic. Loops only look at the
//! shutdown token between runs; a run that is in flight when shutdown starts
//! is cancelled through its own scope (derived from the same token) and
//! publishes a `<FAILED> cancelled` payload before its loop exits.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SensorSpec;
use crate::errors::CloseError;
use crate::exec::{ProcessRunner, RunOutcome};
use crate::transport::{BoxFuture, Transport, publish_and_forget};
use crate::types::QoS;

use super::Closable;

/// Prefix of the payload published when a sensor command fails.
pub const SENSOR_FAILED: &str = "<FAILED>";

/// Failure reason published for a run cut short by shutdown.
pub const REASON_CANCELLED: &str = "cancelled";

/// Payload for a finished sensor run. Every run publishes something.
pub fn sensor_payload(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Success(output) => output,
        RunOutcome::Failed { reason, .. } => format!("{SENSOR_FAILED} {reason}"),
        RunOutcome::Cancelled(_) => format!("{SENSOR_FAILED} {REASON_CANCELLED}"),
    }
}

/// Everything one sensor loop needs; cloned into its task.
struct SensorLoop<T: Transport> {
    spec: SensorSpec,
    transport: Arc<T>,
    runner: ProcessRunner,
    publish_qos: QoS,
    shutdown: CancellationToken,
}

impl<T: Transport> SensorLoop<T> {
    async fn run(self) {
        info!(sensor = %self.spec.name, interval = ?self.spec.interval, "sensor started");

        // The first tick completes immediately.
        let mut ticker = tokio::time::interval(self.spec.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.poll_once().await;
        }

        debug!(sensor = %self.spec.name, "sensor loop finished");
    }

    async fn poll_once(&self) {
        let outcome = self.runner.run(&self.spec.command, &self.shutdown).await;
        if outcome.is_cancelled() {
            debug!(sensor = %self.spec.name, "sensor run cancelled by shutdown");
        }
        let payload = sensor_payload(outcome);

        publish_and_forget(
            &*self.transport,
            &self.spec.topic,
            self.publish_qos,
            self.spec.retained,
            payload,
        )
        .await;
    }
}

/// Polls every configured sensor on its own interval.
pub struct SensorPoller<T: Transport> {
    transport: Arc<T>,
    runner: ProcessRunner,
    sensors: Vec<SensorSpec>,
    publish_qos: QoS,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> fmt::Debug for SensorPoller<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorPoller")
            .field("sensors", &self.sensors.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SensorPoller<T> {
    pub fn new(
        transport: Arc<T>,
        runner: ProcessRunner,
        sensors: Vec<SensorSpec>,
        publish_qos: QoS,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            runner,
            sensors,
            publish_qos,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn one loop per sensor.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        for spec in self.sensors.iter() {
            let sensor = SensorLoop {
                spec: spec.clone(),
                transport: Arc::clone(&self.transport),
                runner: self.runner.clone(),
                publish_qos: self.publish_qos,
                shutdown: self.shutdown.clone(),
            };
            tasks.push(tokio::spawn(sensor.run()));
        }
    }

    /// Stop every loop and wait for them to return, or until `timeout`.
    pub async fn stop(&self, timeout: Duration) -> Result<(), CloseError> {
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        let drained = async {
            for task in tasks {
                let _ = task.await;
            }
        };

        tokio::time::timeout(timeout, drained)
            .await
            .map_err(|_| CloseError {
                component: "sensor poller",
                timeout,
            })
    }
}

impl<T: Transport> Closable for SensorPoller<T> {
    fn name(&self) -> &'static str {
        "sensor poller"
    }

    fn close(&self, timeout: Duration) -> BoxFuture<'_, Result<(), CloseError>> {
        Box::pin(self.stop(timeout))
    }
}
