// src/transport/mod.rs

//! Publish/subscribe transport abstraction.
//!
//! Everything that talks to the broker goes through the [`Transport`] trait
//! instead of a concrete client. This keeps the trigger controller, sensor
//! poller and availability reporter independent of the wire protocol and
//! lets tests swap in an in-memory fake.
//!
//! - [`mqtt`] provides `MqttTransport`, the production implementation.
//! - Publishing is fire-and-forget by default: `publish` resolves once the
//!   message is queued and returns a [`PublishAck`] that callers may ignore.
//!   Only the availability reporter's final "unavailable" message waits on
//!   its acknowledgement.

pub mod mqtt;

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use crate::errors::{ExecutorError, Result};
use crate::types::QoS;

pub use mqtt::{BrokerAddress, MqttSettings, MqttTransport};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Callback invoked by the transport for every message on a subscribed topic.
///
/// Handlers are called from the transport's event loop and must return
/// quickly; long-running work is spawned onto its own task.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Connection lifecycle notifications emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The broker accepted the connection. `reconnect` is false only for the
    /// very first connection.
    Connected { reconnect: bool },
    /// The connection dropped; the transport keeps retrying.
    Lost(String),
}

/// Handle to the broker acknowledgement of a single publish.
///
/// Dropping it is fine and is what every caller except the availability
/// reporter does.
#[derive(Debug)]
pub struct PublishAck {
    rx: Option<oneshot::Receiver<std::result::Result<(), String>>>,
}

pub type AckSender = oneshot::Sender<std::result::Result<(), String>>;

impl PublishAck {
    /// An acknowledgement that is already complete.
    pub fn acknowledged() -> Self {
        Self { rx: None }
    }

    /// A pending acknowledgement resolved through the returned sender.
    pub fn pending() -> (AckSender, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx: Some(rx) })
    }

    /// Wait until the broker acknowledged the message.
    pub async fn wait(self) -> Result<()> {
        let Some(rx) = self.rx else {
            return Ok(());
        };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ExecutorError::TransportError(reason)),
            Err(_) => Err(ExecutorError::TransportError(
                "acknowledgement dropped before the broker confirmed the publish".to_string(),
            )),
        }
    }
}

/// Capability the bridge components need from a publish/subscribe transport.
pub trait Transport: Send + Sync + 'static {
    /// Queue a message for publishing.
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<PublishAck>>;

    /// Subscribe to `topic`, routing its messages to `handler`.
    fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> BoxFuture<'_, Result<()>>;

    fn unsubscribe(&self, topic: &str) -> BoxFuture<'_, Result<()>>;

    /// Disconnect from the broker. Called last during shutdown.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}

/// Publish without waiting for an acknowledgement, logging failures.
pub async fn publish_and_forget<T: Transport + ?Sized>(
    transport: &T,
    topic: &str,
    qos: QoS,
    retain: bool,
    payload: impl Into<Vec<u8>>,
) {
    if let Err(e) = transport.publish(topic, qos, retain, payload.into()).await {
        warn!(topic = %topic, error = %e, "failed to publish message");
    }
}
