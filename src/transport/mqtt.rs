// src/transport/mqtt.rs

//! `rumqttc`-backed implementation of [`Transport`].
//!
//! The rumqttc event loop runs in a background task that:
//! - dispatches incoming publishes to the handler registered for the topic,
//! - reports connects, reconnects and connection loss as [`ConnectionEvent`]s,
//! - resolves [`PublishAck`]s once the broker confirmed a message.
//!
//! Acknowledgement tracking relies on rumqttc sending requests in the order
//! they were queued: each publish pushes a waiter onto a FIFO under
//! `publish_order`, the event loop pops it when it sees the matching
//! `Outgoing::Publish(pkid)` and then waits for PUBACK (QoS 1) or PUBCOMP
//! (QoS 2) with that packet id. QoS 0 messages are acknowledged on send.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ExecutorError, Result};
use crate::types::QoS;

use super::{
    AckSender, BoxFuture, ConnectionEvent, InboundMessage, MessageHandler, PublishAck, Transport,
};

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker host and port parsed from a URI such as `tcp://127.0.0.1:1883`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `tcp://host:port`, `mqtt://host:port` or a bare `host[:port]`.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let rest = match uri.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => {
                return Err(ExecutorError::ConfigError(format!(
                    "unsupported broker scheme '{scheme}' (expected tcp:// or mqtt://)"
                )));
            }
            None => uri,
        };
        let rest = rest.trim_end_matches('/');

        if rest.is_empty() {
            return Err(ExecutorError::ConfigError("broker is missing".to_string()));
        }

        match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ExecutorError::ConfigError(format!("invalid broker port '{port}'"))
                })?;
                if host.is_empty() {
                    return Err(ExecutorError::ConfigError(format!(
                        "broker host is missing in '{uri}'"
                    )));
                }
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self {
                host: rest.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection settings for [`MqttTransport::connect`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: BrokerAddress,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// `(topic, payload)` published retained by the broker if we vanish
    /// without a clean disconnect.
    pub last_will: Option<(String, String)>,
}

impl MqttSettings {
    fn to_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(ref username) = self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }

        if let Some((ref topic, ref payload)) = self.last_will {
            options.set_last_will(LastWill::new(
                topic.clone(),
                payload.clone().into_bytes(),
                rumqttc::QoS::AtLeastOnce,
                true,
            ));
        }

        options
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Waiters for publish acknowledgements.
#[derive(Default)]
struct AckTable {
    /// Queued but not yet written to the socket, in request order.
    queued: VecDeque<(QoS, AckSender)>,
    /// Written, waiting for PUBACK / PUBCOMP, by packet id.
    inflight: HashMap<u16, AckSender>,
}

impl AckTable {
    fn sent(&mut self, pkid: u16) {
        // A pkid we already track is a retransmission after reconnect.
        if pkid != 0 && self.inflight.contains_key(&pkid) {
            return;
        }

        let Some((qos, tx)) = self.queued.pop_front() else {
            return;
        };

        if qos == QoS::AtMostOnce {
            let _ = tx.send(Ok(()));
        } else {
            self.inflight.insert(pkid, tx);
        }
    }

    fn acknowledged(&mut self, pkid: u16) {
        if let Some(tx) = self.inflight.remove(&pkid) {
            let _ = tx.send(Ok(()));
        }
    }

    fn fail_all(&mut self, reason: &str) {
        for (_, tx) in self.queued.drain(..) {
            let _ = tx.send(Err(reason.to_string()));
        }
        for (_, tx) in self.inflight.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}

/// State shared between the transport handle and its event-loop task.
#[derive(Default)]
struct Shared {
    subscriptions: RwLock<HashMap<String, MessageHandler>>,
    acks: Mutex<AckTable>,
}

impl Shared {
    fn dispatch(&self, message: InboundMessage) {
        let handler = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.topic)
            .cloned();

        match handler {
            Some(handler) => handler(message),
            None => debug!(topic = %message.topic, "message on topic without handler; ignoring"),
        }
    }

    fn acks(&self) -> std::sync::MutexGuard<'_, AckTable> {
        self.acks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// MQTT transport used in production.
pub struct MqttTransport {
    client: AsyncClient,
    shared: Arc<Shared>,
    publish_order: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttTransport").finish_non_exhaustive()
    }
}

impl MqttTransport {
    /// Connect to the broker and wait for the first CONNACK.
    ///
    /// Returns the transport and a receiver for subsequent connection events
    /// (reconnects in particular). Failing to establish the very first
    /// connection is an error; later connection losses are retried forever.
    pub async fn connect(
        settings: MqttSettings,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ConnectionEvent>)> {
        info!(broker = %settings.broker, client_id = %settings.client_id, "connecting to broker");

        let (client, event_loop) = AsyncClient::new(settings.to_options(), REQUEST_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = tokio::spawn(drive_event_loop(
            event_loop,
            Arc::clone(&shared),
            events_tx,
            ready_tx,
            shutdown.clone(),
        ));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                return Err(ExecutorError::TransportError(format!(
                    "error while connecting to broker {}: {reason}",
                    settings.broker
                )));
            }
            Err(_) => {
                return Err(ExecutorError::TransportError(
                    "mqtt event loop exited before connecting".to_string(),
                ));
            }
        }

        let transport = Arc::new(Self {
            client,
            shared,
            publish_order: tokio::sync::Mutex::new(()),
            shutdown,
            event_loop: Mutex::new(Some(handle)),
        });

        Ok((transport, events_rx))
    }

    fn take_event_loop(&self) -> Option<JoinHandle<()>> {
        self.event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Transport for MqttTransport {
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<PublishAck>> {
        let topic = topic.to_string();

        Box::pin(async move {
            let _order = self.publish_order.lock().await;

            let (tx, ack) = PublishAck::pending();
            self.shared.acks().queued.push_back((qos, tx));

            if let Err(e) = self
                .client
                .publish(topic.clone(), to_mqtt_qos(qos), retain, payload)
                .await
            {
                // Never reached the request channel, so it is still last.
                self.shared.acks().queued.pop_back();
                return Err(ExecutorError::TransportError(format!(
                    "publish to '{topic}' failed: {e}"
                )));
            }

            debug!(topic = %topic, %qos, retain, "message queued for publishing");
            Ok(ack)
        })
    }

    fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> BoxFuture<'_, Result<()>> {
        let topic = topic.to_string();

        Box::pin(async move {
            self.shared
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(topic.clone(), handler);

            self.client
                .subscribe(topic.clone(), to_mqtt_qos(qos))
                .await
                .map_err(|e| {
                    ExecutorError::TransportError(format!("subscribe to '{topic}' failed: {e}"))
                })?;

            debug!(topic = %topic, %qos, "subscribed");
            Ok(())
        })
    }

    fn unsubscribe(&self, topic: &str) -> BoxFuture<'_, Result<()>> {
        let topic = topic.to_string();

        Box::pin(async move {
            self.shared
                .subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&topic);

            self.client.unsubscribe(topic.clone()).await.map_err(|e| {
                ExecutorError::TransportError(format!("unsubscribe from '{topic}' failed: {e}"))
            })?;

            debug!(topic = %topic, "unsubscribed");
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!("disconnecting from broker");

            let result = self.client.disconnect().await.map_err(|e| {
                ExecutorError::TransportError(format!("disconnect failed: {e}"))
            });
            if result.is_err() {
                self.shutdown.cancel();
            }

            // Give the event loop a chance to flush DISCONNECT, then stop it.
            if let Some(handle) = self.take_event_loop() {
                if tokio::time::timeout(DISCONNECT_TIMEOUT, handle).await.is_err() {
                    warn!(timeout = ?DISCONNECT_TIMEOUT, "mqtt event loop did not stop in time");
                }
            }
            self.shutdown.cancel();

            self.shared.acks().fail_all("transport disconnected");
            result
        })
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    events: mpsc::Sender<ConnectionEvent>,
    ready: oneshot::Sender<std::result::Result<(), String>>,
    shutdown: CancellationToken,
) {
    let mut ready = Some(ready);
    let mut connected_once = false;

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                let reconnect = connected_once;
                connected_once = true;
                info!(reconnect, "connected to broker");

                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }
                notify(&events, ConnectionEvent::Connected { reconnect });
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, "incoming message");
                shared.dispatch(InboundMessage::new(publish.topic, publish.payload.to_vec()));
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => shared.acks().acknowledged(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => shared.acks().acknowledged(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => shared.acks().sent(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent; stopping mqtt event loop");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }

                warn!(error = %e, "connection to broker lost");
                notify(&events, ConnectionEvent::Lost(e.to_string()));

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    debug!("mqtt event loop finished");
}

fn notify(events: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    if let Err(e) = events.try_send(event) {
        debug!(error = %e, "connection event dropped (no listener or listener lagging)");
    }
}
