// src/bridge/trigger.rs

//! Trigger controller: START/STOP messages drive external commands.
//!
//! For a trigger subscribed on `<topic>`:
//! - `START` runs the command unless one is already running for that trigger,
//!   publishing `RUNNING` on `<topic>/STATE` first.
//! - When the command ends, its result goes to `<topic>/RESULT` (raw output,
//!   `<INTERRUPTED>` or `<FAILED>;<reason>`), followed by `STOPPED`.
//! - `STOP` cancels the running command and frees the trigger immediately.
//!
//! Two pieces of bookkeeping cooperate here. The running-set (`running`)
//! enforces one logical run per trigger name and is checked and updated under
//! a single write lock. The execution registry, reached through the
//! [`ProcessRunner`], tracks the physical process so that shutdown can cancel
//! and drain it regardless of which trigger started it.
//!
//! Every run holds its trigger's publish lane from `RUNNING` until `STOPPED`.
//! A run started right after a `STOP` therefore waits for the previous run to
//! publish its `STOPPED` before announcing `RUNNING`.
//!
//! State publishes additionally go through a per-trigger `state` lock that
//! remembers the last state put on the bus. A reconnect republishes exactly
//! that value under the same lock, so it can never land a stale `RUNNING`
//! after the run's `STOPPED`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TriggerConfig;
use crate::errors::{CloseError, Result};
use crate::exec::{ProcessRunner, RunOutcome};
use crate::transport::{
    BoxFuture, InboundMessage, MessageHandler, Transport, publish_and_forget,
};
use crate::types::QoS;

use super::Closable;

pub const TOPIC_SUFFIX_STATE: &str = "STATE";
pub const TOPIC_SUFFIX_RESULT: &str = "RESULT";
pub const PAYLOAD_STATUS_RUNNING: &str = "RUNNING";
pub const PAYLOAD_STATUS_STOPPED: &str = "STOPPED";
pub const PAYLOAD_START: &str = "START";
pub const PAYLOAD_STOP: &str = "STOP";
pub const RESULT_INTERRUPTED: &str = "<INTERRUPTED>";
pub const RESULT_FAILED: &str = "<FAILED>";

/// Action requested by an inbound trigger message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Start,
    Stop,
}

impl TriggerAction {
    /// Case-insensitive, otherwise exact: `" START"` is not a start.
    pub fn parse(payload: &str) -> Option<Self> {
        if payload.eq_ignore_ascii_case(PAYLOAD_START) {
            Some(TriggerAction::Start)
        } else if payload.eq_ignore_ascii_case(PAYLOAD_STOP) {
            Some(TriggerAction::Stop)
        } else {
            None
        }
    }
}

pub fn state_topic(topic: &str) -> String {
    format!("{topic}/{TOPIC_SUFFIX_STATE}")
}

pub fn result_topic(topic: &str) -> String {
    format!("{topic}/{TOPIC_SUFFIX_RESULT}")
}

/// Payload published on `<topic>/RESULT` for a finished run.
pub fn result_payload(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Success(output) => output.clone(),
        RunOutcome::Cancelled(_) => RESULT_INTERRUPTED.to_string(),
        RunOutcome::Failed { reason, .. } => format!("{RESULT_FAILED};{reason}"),
    }
}

/// The running-set entry for one trigger.
struct RunSlot {
    run_id: u64,
    cancel: CancellationToken,
}

#[derive(Clone)]
struct TriggerEntry {
    config: TriggerConfig,
    lane: Arc<Mutex<()>>,
    /// Last state published on `<topic>/STATE`.
    state: Arc<Mutex<&'static str>>,
}

/// Maps inbound START/STOP messages to command executions.
pub struct TriggerController<T: Transport> {
    transport: Arc<T>,
    runner: ProcessRunner,
    triggers: Vec<TriggerEntry>,
    running: RwLock<HashMap<String, RunSlot>>,
    next_run_id: AtomicU64,
    subscribe_qos: QoS,
    publish_qos: QoS,
    initialised: AtomicBool,
}

impl<T: Transport> fmt::Debug for TriggerController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerController")
            .field("triggers", &self.triggers.len())
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> TriggerController<T> {
    pub fn new(
        transport: Arc<T>,
        runner: ProcessRunner,
        triggers: Vec<TriggerConfig>,
        subscribe_qos: QoS,
        publish_qos: QoS,
    ) -> Arc<Self> {
        let triggers = triggers
            .into_iter()
            .map(|config| TriggerEntry {
                config,
                lane: Arc::new(Mutex::new(())),
                state: Arc::new(Mutex::new(PAYLOAD_STATUS_STOPPED)),
            })
            .collect();

        Arc::new(Self {
            transport,
            runner,
            triggers,
            running: RwLock::new(HashMap::new()),
            next_run_id: AtomicU64::new(1),
            subscribe_qos,
            publish_qos,
            initialised: AtomicBool::new(false),
        })
    }

    /// Subscribe every trigger topic and publish `STOPPED` for each.
    pub async fn initialise(self: &Arc<Self>) -> Result<()> {
        for entry in self.triggers.iter() {
            let topic = &entry.config.topic;
            self.transport
                .subscribe(topic, self.subscribe_qos, self.handler(&entry.config.name))
                .await?;
            self.publish_state(entry, PAYLOAD_STATUS_STOPPED).await;

            info!(trigger = %entry.config.name, topic = %topic, "trigger registered");
        }

        self.initialised.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::SeqCst)
    }

    /// Re-subscribe after a broker reconnect and republish the last state
    /// each trigger put on the bus so observers can resynchronise.
    pub async fn on_reconnect(self: &Arc<Self>) {
        if !self.is_initialised() {
            return;
        }

        info!("reinitialising triggers after reconnect");

        for entry in self.triggers.iter() {
            let topic = &entry.config.topic;
            if let Err(e) = self
                .transport
                .subscribe(topic, self.subscribe_qos, self.handler(&entry.config.name))
                .await
            {
                warn!(trigger = %entry.config.name, error = %e, "failed to re-subscribe trigger topic");
            }

            let state = entry.state.lock().await;
            self.send_state(topic, *state).await;
        }
    }

    fn handler(self: &Arc<Self>, name: &str) -> MessageHandler {
        // Weak, so the transport's handler table does not keep us alive.
        let controller: Weak<Self> = Arc::downgrade(self);
        let name = name.to_string();

        Arc::new(move |message: InboundMessage| {
            if let Some(controller) = controller.upgrade() {
                controller.handle_message(&name, &message);
            }
        })
    }

    /// Dispatch one inbound message for trigger `name`. Never blocks.
    pub fn handle_message(self: &Arc<Self>, name: &str, message: &InboundMessage) {
        let payload = message.payload_str();
        info!(trigger = %name, topic = %message.topic, payload = %payload, "incoming message");

        match TriggerAction::parse(&payload) {
            Some(TriggerAction::Start) => {
                self.start_command(name);
            }
            Some(TriggerAction::Stop) => {
                self.stop_command(name);
            }
            None => warn!(trigger = %name, payload = %payload, "invalid payload; doing nothing"),
        }
    }

    /// Start the trigger's command unless it is already running.
    ///
    /// Returns `true` if a new run was started. The run itself happens on
    /// its own task.
    pub fn start_command(self: &Arc<Self>, name: &str) -> bool {
        let Some(entry) = self.entry(name).cloned() else {
            warn!(trigger = %name, "unknown trigger");
            return false;
        };

        let (run_id, cancel) = {
            let mut running = self.running_mut();
            if running.contains_key(name) {
                warn!(trigger = %name, "command is already running; skipping execution");
                return false;
            }

            let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            running.insert(
                name.to_string(),
                RunSlot {
                    run_id,
                    cancel: cancel.clone(),
                },
            );
            (run_id, cancel)
        };

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.execute(entry, run_id, cancel).await;
        });

        true
    }

    /// Cancel the trigger's running command and free the trigger.
    ///
    /// Returns `true` if a run was cancelled. The cancelled run still
    /// publishes its `<INTERRUPTED>` result and `STOPPED` state.
    pub fn stop_command(&self, name: &str) -> bool {
        let slot = self.running_mut().remove(name);

        match slot {
            Some(slot) => {
                info!(trigger = %name, run = slot.run_id, "interrupting command");
                slot.cancel.cancel();
                true
            }
            None => {
                debug!(trigger = %name, "no command running; nothing to stop");
                false
            }
        }
    }

    async fn execute(&self, entry: TriggerEntry, run_id: u64, cancel: CancellationToken) {
        let _lane = entry.lane.lock().await;
        let name = &entry.config.name;
        let topic = &entry.config.topic;

        self.publish_state(&entry, PAYLOAD_STATUS_RUNNING).await;

        let outcome = self.runner.run(&entry.config.command, &cancel).await;
        debug!(trigger = %name, run = run_id, %outcome, "trigger run finished");

        publish_and_forget(
            &*self.transport,
            &result_topic(topic),
            self.publish_qos,
            false,
            result_payload(&outcome),
        )
        .await;
        self.publish_state(&entry, PAYLOAD_STATUS_STOPPED).await;

        self.finish(name, run_id);
    }

    /// Remove the slot unless a STOP already did (and a newer run took it).
    fn finish(&self, name: &str, run_id: u64) {
        let mut running = self.running_mut();
        if running.get(name).is_some_and(|slot| slot.run_id == run_id) {
            running.remove(name);
        }
    }

    async fn publish_state(&self, entry: &TriggerEntry, state: &'static str) {
        let mut last = entry.state.lock().await;
        self.send_state(&entry.config.topic, state).await;
        *last = state;
    }

    async fn send_state(&self, topic: &str, state: &str) {
        publish_and_forget(
            &*self.transport,
            &state_topic(topic),
            self.publish_qos,
            false,
            state,
        )
        .await;
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running_ref().contains_key(name)
    }

    /// Names in the running-set, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running_ref().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn entry(&self, name: &str) -> Option<&TriggerEntry> {
        self.triggers.iter().find(|t| t.config.name == name)
    }

    fn running_ref(&self) -> RwLockReadGuard<'_, HashMap<String, RunSlot>> {
        self.running.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn running_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, RunSlot>> {
        self.running.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unsubscribe every trigger topic.
    ///
    /// Running commands are cancelled and drained by the execution registry,
    /// not here.
    pub async fn unsubscribe_all(&self) {
        for entry in self.triggers.iter() {
            if let Err(e) = self.transport.unsubscribe(&entry.config.topic).await {
                warn!(trigger = %entry.config.name, error = %e, "failed to unsubscribe trigger topic");
            }
        }
    }
}

impl<T: Transport> Closable for TriggerController<T> {
    fn name(&self) -> &'static str {
        "trigger controller"
    }

    /// Unsubscribing is local bookkeeping, so the timeout is not applied.
    fn close(&self, _timeout: Duration) -> BoxFuture<'_, std::result::Result<(), CloseError>> {
        Box::pin(async move {
            self.unsubscribe_all().await;
            Ok(())
        })
    }
}
