// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`registry`] tracks every running command together with its
//!   cancellation token and drains them on shutdown.
//! - [`runner`] spawns one command with `tokio::process::Command`, captures
//!   its combined output and classifies the outcome.

pub mod registry;
pub mod runner;

pub use registry::{Execution, ExecutionId, ExecutionRegistry};
pub use runner::{ProcessRunner, RunOutcome};
