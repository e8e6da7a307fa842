use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mqtt_executor::errors::{ExecutorError, Result};
use mqtt_executor::transport::{
    AckSender, BoxFuture, InboundMessage, MessageHandler, PublishAck, Transport,
};
use mqtt_executor::types::QoS;

/// One message handed to [`FakeTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// An in-memory transport that:
/// - records every publish in order
/// - keeps subscription handlers so tests can inject messages with
///   [`deliver`](Self::deliver)
/// - acknowledges publishes immediately, or holds them until
///   [`release_acks`](Self::release_acks) when `hold_acks(true)` is set.
#[derive(Default)]
pub struct FakeTransport {
    published: Mutex<Vec<Published>>,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    subscribe_calls: Mutex<Vec<String>>,
    unsubscribed: Mutex<Vec<String>>,
    pending_acks: Mutex<Vec<AckSender>>,
    hold_acks: AtomicBool,
    fail_publish: AtomicBool,
    /// Number of publishes recorded when `disconnect` was called.
    disconnected_at: Mutex<Option<usize>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Payloads published on `topic`, in order.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Poll until at least `count` payloads were published on `topic`.
    ///
    /// Panics after 10 seconds.
    pub async fn wait_for_payloads(&self, topic: &str, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let payloads = self.payloads(topic);
            if payloads.len() >= count {
                return payloads;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {count} payloads on '{topic}', got {payloads:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Hand `payload` to the handler subscribed on `topic`.
    ///
    /// Returns `false` if nothing is subscribed there.
    pub fn deliver(&self, topic: &str, payload: &str) -> bool {
        let handler = self.handlers.lock().unwrap().get(topic).cloned();
        match handler {
            Some(handler) => {
                handler(InboundMessage::new(topic, payload.as_bytes().to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(topic)
    }

    /// Every `subscribe` call, including repeated ones, in order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.subscribe_calls.lock().unwrap().clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }

    pub fn hold_acks(&self, hold: bool) {
        self.hold_acks.store(hold, Ordering::SeqCst);
    }

    /// Confirm every held publish.
    pub fn release_acks(&self) {
        for ack in self.pending_acks.lock().unwrap().drain(..) {
            let _ = ack.send(Ok(()));
        }
    }

    pub fn held_acks(&self) -> usize {
        self.pending_acks.lock().unwrap().len()
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected_at.lock().unwrap().is_some()
    }

    /// Publishes that happened before `disconnect`.
    pub fn published_before_disconnect(&self) -> Option<Vec<Published>> {
        let at = (*self.disconnected_at.lock().unwrap())?;
        Some(self.published.lock().unwrap()[..at].to_vec())
    }
}

impl Transport for FakeTransport {
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<PublishAck>> {
        let topic = topic.to_string();
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(ExecutorError::TransportError(format!(
                    "publish to '{topic}' rejected by fake transport"
                )));
            }

            self.published.lock().unwrap().push(Published {
                topic,
                payload: String::from_utf8_lossy(&payload).into_owned(),
                qos,
                retain,
            });

            if self.hold_acks.load(Ordering::SeqCst) {
                let (tx, ack) = PublishAck::pending();
                self.pending_acks.lock().unwrap().push(tx);
                Ok(ack)
            } else {
                Ok(PublishAck::acknowledged())
            }
        })
    }

    fn subscribe(
        &self,
        topic: &str,
        _qos: QoS,
        handler: MessageHandler,
    ) -> BoxFuture<'_, Result<()>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.subscribe_calls.lock().unwrap().push(topic.clone());
            self.handlers.lock().unwrap().insert(topic, handler);
            Ok(())
        })
    }

    fn unsubscribe(&self, topic: &str) -> BoxFuture<'_, Result<()>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.handlers.lock().unwrap().remove(&topic);
            self.unsubscribed.lock().unwrap().push(topic);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let count = self.published.lock().unwrap().len();
            *self.disconnected_at.lock().unwrap() = Some(count);
            Ok(())
        })
    }
}
