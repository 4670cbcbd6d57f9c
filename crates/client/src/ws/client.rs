//! Event stream client: one managed connection with auto-reconnect.
//!
//! The client owns at most one live connection. A background task per
//! connection attempt performs the handshake (bounded by the connect
//! deadline), pumps inbound frames into the [`Multiplexer`] and drains the
//! outbound queue. Transport failures never surface to callers; they are
//! logged, published as [`ClientEvent::Disconnected`] and fed into the
//! reconnect policy.

use std::sync::Arc;

use fixline_shared::{event_types, Envelope, CLOSE_NORMAL};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::connection::{
    ClientEvent, CloseInfo, ConnectionState, Connector, DisconnectReason, Frame, ReconnectPolicy,
    ReconnectStep, Transport, TungsteniteConnector,
};
use super::multiplexer::{Handler, Multiplexer, Subscription};
use crate::config::ClientConfig;

const CLOSE_REASON_USER: &str = "Disconnected by user";

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

enum PumpExit {
    /// We sent the close frame ourselves.
    Local,
    Lost(DisconnectReason),
}

struct Link {
    /// Bumped on every connect/disconnect so callbacks from superseded
    /// connection tasks are ignored.
    id: u64,
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    /// Link id whose task is flushing a user-requested close.
    closing: Option<u64>,
}

struct Timers {
    policy: ReconnectPolicy,
    retry: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
    /// Bumped by `disconnect()`; timers armed under an older epoch never connect.
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Retry,
    Cooldown,
}

impl Timers {
    fn cancel(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        if let Some(cooldown) = self.cooldown.take() {
            cooldown.abort();
        }
    }
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    mux: Multiplexer,
    link: Mutex<Link>,
    timers: Mutex<Timers>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    fn set_state(&self, link: &mut Link, state: ConnectionState) {
        link.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Handle to the event stream. Cloning is cheap and every clone drives the
/// same connection.
#[derive(Clone)]
pub struct EventClient {
    inner: Arc<Inner>,
}

impl EventClient {
    /// Client that connects with tokio-tungstenite.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let mux = Multiplexer::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                mux,
                link: Mutex::new(Link {
                    id: 0,
                    state: ConnectionState::Disconnected,
                    outbound: None,
                    task: None,
                    heartbeat: None,
                    closing: None,
                }),
                timers: Mutex::new(Timers {
                    policy,
                    retry: None,
                    cooldown: None,
                    epoch: 0,
                }),
                state_tx,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Start the client. Must be called from within a tokio runtime.
    pub fn init(&self) {
        crate::log_info!("Starting event stream client for {}", self.inner.config.endpoint);
        self.connect();
    }

    /// Stop the client: closes the connection and cancels every timer.
    pub fn teardown(&self) {
        self.disconnect();
        crate::log_info!("Event stream client stopped");
    }

    /// Like [`teardown`](Self::teardown), but waits (bounded by the connect
    /// deadline) for the close frame to be flushed.
    pub async fn shutdown(&self) {
        self.disconnect();
        let task = {
            let mut link = self.inner.link.lock();
            if link.state == ConnectionState::Closing {
                link.task.take()
            } else {
                None
            }
        };
        if let Some(task) = task {
            let deadline = self.inner.config.connect_timeout;
            if tokio::time::timeout(deadline, task).await.is_err() {
                crate::log_warn!("Close handshake did not finish within {:?}", deadline);
            }
        }
        crate::log_info!("Event stream client stopped");
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().state
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Broadcast channel carrying status changes and every parsed message.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.mux.events()
    }

    /// Current reconnect attempt counter (0 after a successful open).
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.timers.lock().policy.attempt()
    }

    // --- Lifecycle ---

    /// Open the connection. No-op while already open; otherwise any stale
    /// connection attempt is abandoned and a fresh one is started.
    pub fn connect(&self) {
        let mut link = self.inner.link.lock();
        if link.state == ConnectionState::Open {
            crate::log_debug!("Event stream already connected");
            return;
        }
        if let Some(task) = link.task.take() {
            crate::log_debug!("Abandoning previous connection before reconnecting");
            task.abort();
        }
        if let Some(heartbeat) = link.heartbeat.take() {
            heartbeat.abort();
        }
        link.outbound = None;
        link.closing = None;
        link.id += 1;
        let id = link.id;
        self.inner.set_state(&mut link, ConnectionState::Connecting);

        let client = self.clone();
        link.task = Some(tokio::spawn(async move { client.run_connection(id).await }));
    }

    /// Close the connection with a normal-closure code, cancel pending
    /// reconnects and clear every subscription. Safe to call repeatedly.
    pub fn disconnect(&self) {
        // Lock order is timers, then link.
        let mut timers = self.inner.timers.lock();
        timers.epoch += 1;
        timers.cancel();

        let was_active = {
            let mut link = self.inner.link.lock();
            if let Some(heartbeat) = link.heartbeat.take() {
                heartbeat.abort();
            }
            let previous = link.state;
            match (previous, link.outbound.take()) {
                (ConnectionState::Open, Some(outbound)) => {
                    let queued = outbound
                        .send(Outbound::Close {
                            code: CLOSE_NORMAL,
                            reason: CLOSE_REASON_USER.to_string(),
                        })
                        .is_ok();
                    if queued {
                        link.closing = Some(link.id);
                        self.inner.set_state(&mut link, ConnectionState::Closing);
                    } else {
                        self.inner.set_state(&mut link, ConnectionState::Disconnected);
                    }
                }
                // A close is already being flushed; let it finish.
                (ConnectionState::Closing, _) => {}
                _ => {
                    if let Some(task) = link.task.take() {
                        task.abort();
                    }
                    self.inner.set_state(&mut link, ConnectionState::Disconnected);
                }
            }
            link.id += 1;
            matches!(previous, ConnectionState::Open | ConnectionState::Connecting)
        };

        timers.policy.reset();
        drop(timers);
        self.inner.mux.clear();

        if was_active {
            crate::log_info!("Event stream disconnected by user");
            self.inner.mux.publish(ClientEvent::Disconnected {
                reason: DisconnectReason::ClientRequest,
            });
        }
    }

    // --- Outbound ---

    /// Send a typed command. Returns `false` without touching the network
    /// unless the connection is open.
    pub fn send(&self, event_type: &str, payload: Value) -> bool {
        let link = self.inner.link.lock();
        let outbound = match (&link.outbound, link.state) {
            (Some(outbound), ConnectionState::Open) => outbound,
            _ => {
                crate::log_warn!("Cannot send {}, event stream is not connected", event_type);
                return false;
            }
        };
        let json = match Envelope::new(event_type, payload).to_json() {
            Ok(json) => json,
            Err(e) => {
                crate::log_error!("Failed to serialize {}: {}", event_type, e);
                return false;
            }
        };
        outbound.send(Outbound::Text(json)).is_ok()
    }

    // --- Subscriptions ---

    pub fn subscribe(&self, event_type: &str, handler: Handler) -> Subscription {
        self.inner.mux.subscribe(event_type, handler)
    }

    /// Closure flavour of [`subscribe`](Self::subscribe).
    pub fn on<F>(&self, event_type: &str, f: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.mux.subscribe(event_type, Arc::new(f))
    }

    pub fn subscribe_all(&self, handler: Handler) -> Subscription {
        self.inner.mux.subscribe_all(handler)
    }

    pub fn subscribe_payload<T, F>(&self, event_type: &str, f: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.mux.subscribe_payload(event_type, f)
    }

    pub fn unsubscribe(&self, event_type: &str, handler: Option<&Handler>) {
        self.inner.mux.unsubscribe(event_type, handler)
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.inner.mux
    }

    // --- Connection task ---

    async fn run_connection(self, id: u64) {
        let url = self.inner.config.endpoint.clone();
        let deadline = self.inner.config.connect_timeout;
        crate::log_info!("Connecting to event stream at {}", url);

        let transport =
            match tokio::time::timeout(deadline, self.inner.connector.connect(&url)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    crate::log_error!("Event stream error for {}: {}", url, e);
                    self.connection_lost(id, DisconnectReason::Error(e.to_string()));
                    return;
                }
                Err(_) => {
                    crate::log_warn!("Event stream connection attempt timed out after {:?}", deadline);
                    self.connection_lost(id, DisconnectReason::Timeout);
                    return;
                }
            };

        let (tx, rx) = mpsc::unbounded_channel();
        if !self.mark_open(id, tx) {
            return;
        }

        match self.pump(transport, rx).await {
            PumpExit::Local => self.mark_closed(id),
            PumpExit::Lost(reason) => {
                // The peer may hang up while our own close is in flight.
                self.mark_closed(id);
                self.connection_lost(id, reason);
            }
        }
    }

    fn mark_open(&self, id: u64, outbound: mpsc::UnboundedSender<Outbound>) -> bool {
        {
            let mut link = self.inner.link.lock();
            if link.id != id {
                return false;
            }
            link.outbound = Some(outbound);
            self.inner.set_state(&mut link, ConnectionState::Open);

            let client = self.clone();
            let delay = self.inner.config.heartbeat_delay;
            link.heartbeat = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if !client.send(event_types::PING, json!({ "status": "checking_connection" })) {
                    crate::log_warn!("Heartbeat ping could not be sent");
                }
            }));
        }

        {
            let mut timers = self.inner.timers.lock();
            timers.cancel();
            timers.policy.reset();
        }

        crate::log_info!("Event stream connected to {}", self.inner.config.endpoint);

        if let Some(identity) = &self.inner.config.identity {
            self.send(
                event_types::USER_LOGGED_IN,
                json!({
                    "userId": identity.user_id,
                    "username": identity.username,
                    "role": identity.role,
                }),
            );
        }

        self.inner.mux.publish(ClientEvent::Connected);
        true
    }

    async fn pump(
        &self,
        transport: Transport,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ) -> PumpExit {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.inner.mux.dispatch_text(&text),
                    Some(Ok(Frame::Binary(bytes))) => self.inner.mux.dispatch_bytes(&bytes),
                    Some(Ok(Frame::Close(info))) => {
                        let info = info.unwrap_or(CloseInfo { code: 1005, reason: String::new() });
                        crate::log_info!("Event stream closed by server: {} {}", info.code, info.reason);
                        return PumpExit::Lost(DisconnectReason::Closed {
                            code: info.code,
                            reason: info.reason,
                        });
                    }
                    Some(Err(e)) => {
                        crate::log_error!("Event stream read error: {}", e);
                        return PumpExit::Lost(DisconnectReason::Error(e.to_string()));
                    }
                    None => {
                        return PumpExit::Lost(DisconnectReason::Closed {
                            code: 1006,
                            reason: "connection dropped".to_string(),
                        });
                    }
                },
                command = outbound.recv() => match command {
                    Some(Outbound::Text(json)) => {
                        if let Err(e) = sink.send(Frame::Text(json)).await {
                            crate::log_error!("Send failed: {}", e);
                            return PumpExit::Lost(DisconnectReason::Error(e.to_string()));
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        if let Err(e) = sink.send(Frame::Close(Some(CloseInfo { code, reason }))).await {
                            crate::log_debug!("Close frame not delivered: {}", e);
                        }
                        let _ = sink.close().await;
                        return PumpExit::Local;
                    }
                    None => return PumpExit::Local,
                },
            }
        }
    }

    fn mark_closed(&self, id: u64) {
        let mut link = self.inner.link.lock();
        if link.closing == Some(id) {
            link.closing = None;
            link.task = None;
            if link.state == ConnectionState::Closing {
                self.inner.set_state(&mut link, ConnectionState::Disconnected);
            }
        }
    }

    /// Close or error that `disconnect()` did not ask for.
    fn connection_lost(&self, id: u64, reason: DisconnectReason) {
        {
            let mut timers = self.inner.timers.lock();
            {
                let mut link = self.inner.link.lock();
                if link.id != id {
                    return;
                }
                link.outbound = None;
                if let Some(heartbeat) = link.heartbeat.take() {
                    heartbeat.abort();
                }
                self.inner.set_state(&mut link, ConnectionState::Disconnected);
            }
            crate::log_warn!("Event stream lost: {}", reason);
            self.schedule_reconnect(&mut timers);
        }

        self.inner.mux.publish(ClientEvent::Disconnected { reason });
    }

    fn schedule_reconnect(&self, timers: &mut Timers) {
        if let Some(retry) = timers.retry.take() {
            retry.abort();
        }
        let epoch = timers.epoch;

        match timers.policy.on_failure() {
            ReconnectStep::Retry { attempt, delay } => {
                crate::log_info!(
                    "Attempting to reconnect in {}ms (attempt #{})",
                    delay.as_millis(),
                    attempt
                );
                let client = self.clone();
                timers.retry = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    client.fire_timer(TimerKind::Retry, epoch);
                }));
            }
            ReconnectStep::Cooldown { cooldown } => {
                if timers.cooldown.is_some() {
                    return;
                }
                crate::log_error!(
                    "Maximum reconnect attempts ({}) reached, retrying in {}ms",
                    timers.policy.config().max_attempts,
                    cooldown.as_millis()
                );
                let client = self.clone();
                timers.cooldown = Some(tokio::spawn(async move {
                    tokio::time::sleep(cooldown).await;
                    client.fire_timer(TimerKind::Cooldown, epoch);
                }));
            }
        }
    }

    /// Reconnect on behalf of an elapsed timer, unless `disconnect()` ran
    /// since it was armed. The timers lock is held across `connect()` so a
    /// concurrent `disconnect()` either wins outright or sees `Connecting`.
    fn fire_timer(&self, kind: TimerKind, epoch: u64) {
        let mut timers = self.inner.timers.lock();
        if timers.epoch != epoch {
            crate::log_debug!("Dropping stale {:?} timer", kind);
            return;
        }
        match kind {
            TimerKind::Retry => timers.retry = None,
            TimerKind::Cooldown => {
                timers.cooldown = None;
                timers.policy.reset();
                crate::log_info!("Resetting reconnection attempts counter");
            }
        }
        self.connect();
    }
}
