//! Push transport
//!
//! One background task owns the Socket.IO connection. It reconnects with
//! exponential backoff and, after every successful connect, re-announces the
//! session user (`identify`) and rejoins open rooms before flushing queued
//! emits, since the server's routing table does not survive a disconnect.
//!
//! Handlers registered with [`PushClient::on_event`] run on that task, one at
//! a time, in arrival order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use loners_protocol::wire::DEFAULT_NAMESPACE;
use loners_protocol::{ClientEvent, EnginePacket, ServerEvent, SocketPacket};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::session::{SessionEvent, SessionStore};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected { sid: String },
    Disconnected,
}

/// Registry of push event handlers
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, Handler>>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_event<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::new(handler));
        Subscription {
            id,
            hub: Arc::downgrade(self),
        }
    }

    /// Invoke every handler registered at call time, in registration order
    pub fn dispatch(&self, event: &ServerEvent) {
        let handlers: Vec<Handler> = self.lock().values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its handler when dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    hub: Weak<EventHub>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

/// Rooms held open, with a count per room so overlapping views share a join
#[derive(Default)]
struct RoomSet {
    rooms: Mutex<BTreeMap<String, usize>>,
}

impl RoomSet {
    /// True if this is the first holder
    fn acquire(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        let count = rooms.entry(room_id.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// True if this was the last holder
    fn release(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        match rooms.get_mut(room_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                rooms.remove(room_id);
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Handle to the push connection (cheap to Clone).
///
/// The connection task stops on [`PushClient::shutdown`] or once the last
/// handle is dropped.
#[derive(Clone)]
pub struct PushClient {
    shared: Arc<Shared>,
}

struct Shared {
    hub: Arc<EventHub>,
    rooms: Arc<RoomSet>,
    commands: mpsc::UnboundedSender<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl PushClient {
    /// Spawn the connection task; must be called inside a tokio runtime
    pub fn connect(config: &ClientConfig, session: Arc<SessionStore>) -> Self {
        let hub = EventHub::new();
        let rooms = Arc::new(RoomSet::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ConnectionTask {
            url: config.websocket_url(),
            keepalive: config.keepalive_interval.max(Duration::from_secs(1)),
            reconnect_min: config.reconnect_min,
            reconnect_max: config.reconnect_max.max(config.reconnect_min),
            session,
            hub: hub.clone(),
            rooms: rooms.clone(),
            commands: commands_rx,
            state: state_tx,
            shutdown: shutdown_rx,
            joined: BTreeSet::new(),
        };
        tokio::spawn(task.run());

        Self {
            shared: Arc::new(Shared {
                hub,
                rooms,
                commands: commands_tx,
                state: state_rx,
                shutdown: shutdown_tx,
            }),
        }
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.shared.hub
    }

    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.shared.hub.on_event(handler)
    }

    /// Queue an emit; delivered once the connection is up
    pub fn emit(&self, event: ClientEvent) {
        if self.shared.commands.send(event).is_err() {
            warn!(
                component = "push",
                event = "push.emit.dropped",
                "Push task stopped, emit dropped"
            );
        }
    }

    /// Hold `room_id` open; joins on first hold and after every reconnect
    pub fn join(&self, room_id: &str) {
        if self.shared.rooms.acquire(room_id) {
            self.emit(ClientEvent::Join {
                room_id: room_id.to_string(),
            });
        }
    }

    pub fn leave(&self, room_id: &str) {
        if self.shared.rooms.release(room_id) {
            self.emit(ClientEvent::Leave {
                room_id: room_id.to_string(),
            });
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shared.shutdown.send(true);
    }
}

enum Exit {
    Shutdown,
    Closed(String),
}

/// What a handled frame means for the connection loop
enum Inbound {
    Nothing,
    /// Engine.IO open; the server must be heard from within `window`
    Opened { window: Duration },
    Connected { sid: String },
}

/// Decode an event for the default namespace; anything else is dropped
fn decode_event(
    namespace: &str,
    name: String,
    args: Vec<serde_json::Value>,
) -> Option<ServerEvent> {
    if namespace != DEFAULT_NAMESPACE {
        debug!(
            component = "push",
            event = "push.event.foreign_namespace",
            namespace = %namespace,
            name = %name,
        );
        return None;
    }
    match ServerEvent::decode(name, args) {
        Ok(event) => {
            debug!(
                component = "push",
                event = "push.event.received",
                name = %event.name(),
            );
            Some(event)
        }
        Err(err) => {
            warn!(
                component = "push",
                event = "push.event.invalid",
                error = %err,
            );
            None
        }
    }
}

struct ConnectionTask {
    url: String,
    keepalive: Duration,
    reconnect_min: Duration,
    reconnect_max: Duration,
    session: Arc<SessionStore>,
    hub: Arc<EventHub>,
    rooms: Arc<RoomSet>,
    commands: mpsc::UnboundedReceiver<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Receiver<bool>,
    /// Rooms joined on the current connection
    joined: BTreeSet<String>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut backoff = self.reconnect_min;
        let mut attempt: u64 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);
            debug!(
                component = "push",
                event = "push.connect.attempt",
                url = %self.url,
                attempt,
            );

            let connect = tokio_tungstenite::connect_async(self.url.as_str());
            let result = tokio::select! {
                result = connect => result,
                _ = self.shutdown.changed() => break,
            };

            match result {
                Ok((ws, _response)) => {
                    let (exit, reached_connected) = self.drive(ws).await;
                    if reached_connected {
                        backoff = self.reconnect_min;
                        attempt = 0;
                    }
                    match exit {
                        Exit::Shutdown => break,
                        Exit::Closed(reason) => info!(
                            component = "push",
                            event = "push.connection.closed",
                            reason = %reason,
                            "Push connection closed, will reconnect"
                        ),
                    }
                }
                Err(err) => warn!(
                    component = "push",
                    event = "push.connect.failed",
                    url = %self.url,
                    attempt,
                    error = %err,
                ),
            }

            self.state.send_replace(ConnectionState::Disconnected);
            tokio::select! {
                _ = sleep(backoff) => {}
                _ = self.shutdown.changed() => break,
            }
            backoff = (backoff * 2).min(self.reconnect_max);
        }

        self.state.send_replace(ConnectionState::Disconnected);
        debug!(component = "push", event = "push.task.stopped");
    }

    /// Run one connection; the flag reports whether Socket.IO connected
    async fn drive(&mut self, ws: WsStream) -> (Exit, bool) {
        let (mut sink, mut stream) = ws.split();
        let mut connected = false;
        self.joined.clear();
        let mut session_events = self.session.subscribe();
        let mut keepalive = interval_at(Instant::now() + self.keepalive, self.keepalive);
        let mut liveness: Option<Duration> = None;
        let mut last_seen = Instant::now();

        loop {
            let deadline = liveness.map(|window| last_seen + window);
            tokio::select! {
                _ = self.shutdown.changed() => {
                    let _ = send_frame(&mut sink, SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    }.to_frame()).await;
                    let _ = sink.close().await;
                    return (Exit::Shutdown, connected);
                }
                frame = stream.next() => {
                    let text = match frame {
                        None => return (Exit::Closed("stream ended".into()), connected),
                        Some(Err(err)) => return (Exit::Closed(err.to_string()), connected),
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) => {
                            return (Exit::Closed("close frame".into()), connected)
                        }
                        Some(Ok(_)) => {
                            last_seen = Instant::now();
                            continue;
                        }
                    };
                    last_seen = Instant::now();
                    let sid = match self.handle_frame(&mut sink, text.as_str()).await {
                        Ok(Inbound::Nothing) => None,
                        Ok(Inbound::Opened { window }) => {
                            liveness = Some(window);
                            None
                        }
                        Ok(Inbound::Connected { sid }) => Some(sid),
                        Err(reason) => return (Exit::Closed(reason), connected),
                    };
                    if let Some(sid) = sid {
                        // identify below reads the session after this point,
                        // so older login events are already covered
                        session_events = session_events.resubscribe();
                        connected = true;
                        info!(
                            component = "push",
                            event = "push.connected",
                            sid = %sid,
                        );
                        self.state.send_replace(ConnectionState::Connected { sid });
                        if let Err(reason) = self.on_connected(&mut sink).await {
                            return (Exit::Closed(reason), connected);
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    return (Exit::Closed("ping timeout".into()), connected);
                }
                command = self.commands.recv(), if connected => {
                    let Some(event) = command else {
                        return (Exit::Shutdown, connected);
                    };
                    if let Err(err) = self.forward(&mut sink, event).await {
                        return (Exit::Closed(err), connected);
                    }
                }
                _ = keepalive.tick(), if connected => {
                    if let Err(err) = emit(&mut sink, &ClientEvent::Ping).await {
                        return (Exit::Closed(err), connected);
                    }
                }
                change = session_events.recv(), if connected => {
                    let identify = match change {
                        Ok(SessionEvent::LoggedIn { .. }) => true,
                        Err(broadcast::error::RecvError::Lagged(_)) => true,
                        _ => false,
                    };
                    if identify {
                        if let Err(err) = self.identify(&mut sink).await {
                            return (Exit::Closed(err), connected);
                        }
                    }
                }
            }
        }
    }

    /// Handle one inbound frame
    async fn handle_frame(&mut self, sink: &mut WsSink, frame: &str) -> Result<Inbound, String> {
        let packet = match EnginePacket::decode(frame) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(
                    component = "push",
                    event = "push.frame.invalid",
                    error = %err,
                );
                return Ok(Inbound::Nothing);
            }
        };

        let inbound = match packet {
            EnginePacket::Open(handshake) => {
                debug!(
                    component = "push",
                    event = "push.engine.open",
                    sid = %handshake.sid,
                    ping_interval_ms = handshake.ping_interval,
                    ping_timeout_ms = handshake.ping_timeout,
                );
                send_frame(sink, SocketPacket::connect().to_frame()).await?;
                Inbound::Opened {
                    window: Duration::from_millis(
                        handshake.ping_interval.saturating_add(handshake.ping_timeout),
                    ),
                }
            }
            EnginePacket::Ping(data) => {
                send_frame(sink, EnginePacket::Pong(data).encode()).await?;
                Inbound::Nothing
            }
            EnginePacket::Close => return Err("engine close".into()),
            EnginePacket::Message(payload) => match SocketPacket::decode(&payload) {
                Ok(SocketPacket::Connect { data, .. }) => Inbound::Connected {
                    sid: data
                        .as_ref()
                        .and_then(|d| d.get("sid"))
                        .and_then(|s| s.as_str())
                        .unwrap_or_default()
                        .to_string(),
                },
                Ok(SocketPacket::Event {
                    namespace,
                    name,
                    args,
                    ..
                }) => {
                    if let Some(event) = decode_event(&namespace, name, args) {
                        self.hub.dispatch(&event);
                    }
                    Inbound::Nothing
                }
                Ok(SocketPacket::Disconnect { .. }) => return Err("server disconnect".into()),
                Ok(SocketPacket::ConnectError { data, .. }) => {
                    return Err(format!(
                        "connect error: {}",
                        data.map(|d| d.to_string()).unwrap_or_default()
                    ))
                }
                Ok(SocketPacket::Ack { .. }) => Inbound::Nothing,
                Err(err) => {
                    warn!(
                        component = "push",
                        event = "push.packet.invalid",
                        error = %err,
                    );
                    Inbound::Nothing
                }
            },
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Inbound::Nothing,
        };
        Ok(inbound)
    }

    /// Re-establish everything the server forgot when the connection dropped
    async fn on_connected(&mut self, sink: &mut WsSink) -> Result<(), String> {
        self.identify(sink).await?;
        for room_id in self.rooms.list() {
            if self.joined.insert(room_id.clone()) {
                emit(sink, &ClientEvent::Join { room_id }).await?;
            }
        }
        Ok(())
    }

    /// Send a queued emit, skipping joins this connection already made
    async fn forward(&mut self, sink: &mut WsSink, event: ClientEvent) -> Result<(), String> {
        let already_joined = match &event {
            ClientEvent::Join { room_id } => !self.joined.insert(room_id.clone()),
            ClientEvent::Leave { room_id } => {
                self.joined.remove(room_id);
                false
            }
            _ => false,
        };
        if already_joined {
            return Ok(());
        }
        emit(sink, &event).await
    }

    async fn identify(&self, sink: &mut WsSink) -> Result<(), String> {
        let session = self.session.current();
        let Some(user_id) = session.user_id() else {
            return Ok(());
        };
        debug!(
            component = "push",
            event = "push.identify",
            user_id = %user_id,
        );
        emit(
            sink,
            &ClientEvent::Identify {
                user_id: user_id.to_string(),
            },
        )
        .await
    }
}

async fn emit(sink: &mut WsSink, event: &ClientEvent) -> Result<(), String> {
    send_frame(sink, SocketPacket::event(event.name(), event.args()).to_frame()).await
}

async fn send_frame(sink: &mut WsSink, frame: String) -> Result<(), String> {
    sink.send(Message::Text(frame.into()))
        .await
        .map_err(|err| err.to_string())
}
