// src/bridge/shutdown.rs

//! Graceful shutdown.
//!
//! All registered components are closed concurrently, each with the same
//! timeout. A component that does not close in time is logged and reported,
//! never escalated. The transport is disconnected only after every
//! component has returned, because unsubscribing triggers and publishing the
//! final availability payload both need a live connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::errors::CloseError;
use crate::transport::Transport;

use super::Closable;

/// What happened during shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Components that did not close within the timeout.
    pub timed_out: Vec<CloseError>,
    /// Set if disconnecting the transport failed.
    pub disconnect_error: Option<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty() && self.disconnect_error.is_none()
    }
}

pub struct ShutdownCoordinator {
    components: Vec<Arc<dyn Closable>>,
    timeout: Duration,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("ShutdownCoordinator")
            .field("components", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            components: Vec::new(),
            timeout,
        }
    }

    pub fn with(mut self, component: Arc<dyn Closable>) -> Self {
        self.components.push(component);
        self
    }

    pub fn add(&mut self, component: Arc<dyn Closable>) {
        self.components.push(component);
    }

    /// Close every component concurrently, then disconnect `transport`.
    pub async fn shutdown<T: Transport + ?Sized>(self, transport: &T) -> ShutdownReport {
        info!(
            components = self.components.len(),
            timeout = ?self.timeout,
            "shutting down"
        );

        let mut report = ShutdownReport::default();
        let mut closing = JoinSet::new();

        for component in self.components {
            let timeout = self.timeout;
            closing.spawn(async move {
                let name = component.name();
                (name, component.close(timeout).await)
            });
        }

        while let Some(joined) = closing.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(component = name, "component closed"),
                Ok((_, Err(e))) => {
                    error!(error = %e, "timeout while waiting for graceful shutdown");
                    report.timed_out.push(e);
                }
                Err(e) => error!(error = %e, "close task failed"),
            }
        }

        if let Err(e) = transport.disconnect().await {
            warn!(error = %e, "failed to disconnect from broker");
            report.disconnect_error = Some(e.to_string());
        }

        info!(clean = report.is_clean(), "shutdown complete");
        report
    }
}
