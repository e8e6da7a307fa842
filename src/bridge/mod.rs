// src/bridge/mod.rs

//! The components that connect the message bus to command execution.
//!
//! - [`trigger`]: START/STOP controlled commands, one run per trigger name.
//! - [`sensor`]: commands polled on an interval whose output is published.
//! - [`availability`]: the liveness payload, withdrawn on shutdown.
//! - [`shutdown`]: closes everything concurrently under a timeout, then
//!   disconnects the transport.
//!
//! Each component, plus the execution registry, implements [`Closable`] so
//! the shutdown coordinator can treat them uniformly.

pub mod availability;
pub mod sensor;
pub mod shutdown;
pub mod trigger;

use std::time::Duration;

use crate::errors::CloseError;
use crate::exec::ExecutionRegistry;
use crate::transport::BoxFuture;

pub use availability::AvailabilityReporter;
pub use sensor::SensorPoller;
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use trigger::{TriggerAction, TriggerController};

/// A component that can be shut down within a time budget.
pub trait Closable: Send + Sync {
    /// Name used in logs and in [`CloseError`].
    fn name(&self) -> &'static str;

    /// Release the component's resources, giving up after `timeout`.
    fn close(&self, timeout: Duration) -> BoxFuture<'_, Result<(), CloseError>>;
}

impl Closable for ExecutionRegistry {
    fn name(&self) -> &'static str {
        "execution registry"
    }

    fn close(&self, timeout: Duration) -> BoxFuture<'_, Result<(), CloseError>> {
        Box::pin(self.close_all(timeout))
    }
}
