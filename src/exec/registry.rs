// src/exec/registry.rs

//! Registry of in-flight command executions.
//!
//! Every external process the bridge runs is registered here for its whole
//! lifetime. The registry owns one cancellation token per execution, so a
//! shutdown can cancel everything that is still running and wait until each
//! runner has returned.
//!
//! Locking:
//! - `gate` is the lifecycle lock. Registrations take its read side for the
//!   short moment it takes to insert an entry; [`ExecutionRegistry::close_all`]
//!   holds its write side for the entire drain. A registration attempted
//!   while a drain is in progress therefore waits, and is refused with
//!   [`ExecutorError::RegistryClosed`] once the drain releases the gate.
//! - `entries` is a plain read/write lock around the map and is never held
//!   across an `.await`, so releasing an execution never waits on the drain.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::errors::{CloseError, ExecutorError, Result};

/// Opaque identity of one registered execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the registry keeps per execution.
#[derive(Clone)]
struct Entry {
    /// Cancels the execution.
    cancel: CancellationToken,
    /// Fired when the execution is released.
    finished: CancellationToken,
}

/// Thread-safe registry of running executions. Share it as `Arc`.
pub struct ExecutionRegistry {
    gate: tokio::sync::RwLock<()>,
    closed: AtomicBool,
    entries: RwLock<HashMap<ExecutionId, Entry>>,
    open: watch::Sender<usize>,
}

impl fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("open_executions", &self.open_executions())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ExecutionRegistry {
    pub fn new() -> Arc<Self> {
        let (open, _) = watch::channel(0usize);
        Arc::new(Self {
            gate: tokio::sync::RwLock::new(()),
            closed: AtomicBool::new(false),
            entries: RwLock::new(HashMap::new()),
            open,
        })
    }

    /// Register a new execution whose cancellation scope is a child of
    /// `parent`.
    ///
    /// Cancelling `parent` (e.g. a sensor poller's shutdown token or a
    /// trigger's STOP token) cancels the execution, and so does
    /// [`close_all`](Self::close_all). The returned [`Execution`] releases
    /// its entry when dropped.
    pub async fn register(self: &Arc<Self>, parent: &CancellationToken) -> Result<Execution> {
        let _gate = self.gate.read().await;

        if self.is_closed() {
            return Err(ExecutorError::RegistryClosed);
        }

        let id = ExecutionId::generate();
        let entry = Entry {
            cancel: parent.child_token(),
            finished: CancellationToken::new(),
        };

        self.entries_mut().insert(id, entry.clone());
        self.open.send_modify(|n| *n += 1);

        trace!(execution = %id, "execution registered");

        Ok(Execution {
            id,
            cancel: entry.cancel,
            finished: entry.finished,
            registry: Arc::clone(self),
        })
    }

    fn release(&self, id: ExecutionId, finished: &CancellationToken) {
        self.entries_mut().remove(&id);
        finished.cancel();
        self.open.send_modify(|n| *n = n.saturating_sub(1));

        trace!(execution = %id, "execution released");
    }

    /// Cancel every registered execution and wait until all of them have
    /// been released, or until `timeout` elapses.
    ///
    /// After this has been called the registry refuses new registrations,
    /// whether or not the drain finished in time. A timeout is reported as
    /// a [`CloseError`]; executions still running at that point keep their
    /// entries until their runners return.
    pub async fn close_all(&self, timeout: Duration) -> std::result::Result<(), CloseError> {
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(()) => {
                info!("all command executions finished");
                Ok(())
            }
            Err(_) => Err(CloseError {
                component: "execution registry",
                timeout,
            }),
        }
    }

    async fn drain(&self) {
        let _gate = self.gate.write().await;
        self.closed.store(true, Ordering::SeqCst);

        let entries: Vec<Entry> = self.entries().values().cloned().collect();
        info!(count = entries.len(), "cancelling running command executions");

        for entry in entries.iter() {
            entry.cancel.cancel();
        }
        for entry in entries.iter() {
            entry.finished.cancelled().await;
        }

        self.wait_idle().await;
        debug!("execution registry drained");
    }

    /// Wait until no execution is registered.
    pub async fn wait_idle(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open == 0).await;
    }

    /// Number of executions registered and not yet released.
    pub fn open_executions(&self) -> usize {
        *self.open.borrow()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<ExecutionId, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<ExecutionId, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered execution. Dropping it releases the registry entry.
pub struct Execution {
    id: ExecutionId,
    cancel: CancellationToken,
    finished: CancellationToken,
    registry: Arc<ExecutionRegistry>,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Execution {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// The execution's cancellation scope.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.registry.release(self.id, &self.finished);
    }
}
