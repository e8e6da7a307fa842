// src/bridge/availability.rs

//! Availability reporter.
//!
//! Publishes the "available" payload (retained) when started and, if an
//! interval is configured, again on every tick. On close it publishes the
//! "unavailable" payload and waits for the broker to acknowledge it before
//! returning. This is the only publish in the crate whose acknowledgement is
//! awaited: a coordinated shutdown ends with a clean DISCONNECT, which does
//! not fire the last-will message, so observers would otherwise never see
//! the transition.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AvailabilityConfig;
use crate::errors::{CloseError, Result};
use crate::transport::{BoxFuture, Transport, publish_and_forget};
use crate::types::QoS;

use super::Closable;

pub const AVAILABILITY_QOS: QoS = QoS::AtLeastOnce;

pub struct AvailabilityReporter<T: Transport> {
    transport: Arc<T>,
    config: AvailabilityConfig,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> fmt::Debug for AvailabilityReporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailabilityReporter")
            .field("topic", &self.config.topic)
            .field("interval", &self.config.interval)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> AvailabilityReporter<T> {
    pub fn new(transport: Arc<T>, config: AvailabilityConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Publish "available" and start the republish loop.
    pub fn start(&self) {
        let transport = Arc::clone(&self.transport);
        let topic = self.config.topic.clone();
        let payload = self.config.payload.available.clone();
        let interval = self.config.interval;
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            publish_and_forget(&*transport, &topic, AVAILABILITY_QOS, true, payload.clone()).await;

            let Some(interval) = interval else {
                shutdown.cancelled().await;
                return;
            };

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        publish_and_forget(&*transport, &topic, AVAILABILITY_QOS, true, payload.clone()).await;
                    }
                }
            }
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(topic = %self.config.topic, "availability reporter started");
    }

    /// Stop the loop, then publish "unavailable" and wait for the broker's
    /// acknowledgement.
    pub async fn report_unavailable(&self) -> Result<()> {
        self.shutdown.cancel();

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let ack = self
            .transport
            .publish(
                &self.config.topic,
                AVAILABILITY_QOS,
                true,
                self.config.payload.unavailable.clone().into_bytes(),
            )
            .await?;
        ack.wait().await?;

        debug!(topic = %self.config.topic, "unavailable payload acknowledged");
        Ok(())
    }
}

impl<T: Transport> Closable for AvailabilityReporter<T> {
    fn name(&self) -> &'static str {
        "availability reporter"
    }

    fn close(&self, timeout: Duration) -> BoxFuture<'_, std::result::Result<(), CloseError>> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.report_unavailable()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(topic = %self.config.topic, error = %e, "failed to publish unavailable payload");
                    Ok(())
                }
                Err(_) => Err(CloseError {
                    component: self.name(),
                    timeout,
                }),
            }
        })
    }
}
