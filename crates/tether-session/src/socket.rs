//! Session core: one socket per WebSocket endpoint.
//!
//! A [`Socket`] is a cloneable handle over shared session state. A spawned
//! driver task owns the transport, the frame parser, the attachment
//! reassembly slot and the pre-open send buffer; every external input
//! (transport events, API commands, the liveness tick) is funnelled through
//! the driver's `select!` loop, so session state is only ever mutated from
//! one task.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_wire::{Frame, FrameData, FrameKind, Packet, PacketKind, Parser};

use crate::error::{is_clean_close, RemoteError, SocketError};
use crate::events::{is_reserved, EventBus};
use crate::hooks::{Hook, HookRegistry};
use crate::jobs::JobTable;
use crate::liveness::{PingState, TickAction, JOB_TIMEOUT, TICK_INTERVAL};
use crate::server::ChannelHost;
use crate::transport::{Connector, Endpoint, Handshake, Transport, TransportEvent};

/// Fixed session id advertised in the handshake.
pub const SESSION_ID: &str = "00000000000000000000";

/// Depth of the API → driver command queue.
const COMMAND_QUEUE: usize = 256;

/// How a session came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Accepted from a listening server.
    Inbound,
    /// Initiated by [`Socket::connect`].
    Outbound,
}

impl Role {
    /// Whether this session was accepted from a listening server.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::Inbound)
    }
}

/// Process-local session identifier, used by channel hosts to key
/// membership tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// OPEN frame payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPayload {
    #[serde(default)]
    sid: String,
    #[serde(default)]
    upgrades: Vec<String>,
    ping_interval: u32,
    ping_timeout: u32,
}

enum Command {
    Packet(Packet),
}

struct Shared {
    id: SocketId,
    role: Role,
    endpoint: Endpoint,
    binary: bool,
    connected: AtomicBool,
    destroyed: AtomicBool,
    jobs: JobTable,
    hooks: HookRegistry,
    bus: EventBus,
    channels: Mutex<HashSet<String>>,
    host: Option<Arc<dyn ChannelHost>>,
    cmd_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

/// One session over one WebSocket endpoint.
#[derive(Clone)]
pub struct Socket {
    shared: Arc<Shared>,
}

impl Socket {
    /// Accept an inbound session from a listening server.
    ///
    /// `binary` support is derived from the upgrade request: a `b64=1`
    /// query parameter means the peer needs base64 textual frames.
    pub fn accept<T: Transport>(
        host: Arc<dyn ChannelHost>,
        handshake: &Handshake,
        peer: Endpoint,
        transport: T,
    ) -> Self {
        let binary = !handshake.wants_base64();
        info!(peer = %peer.url(), binary, "accepting session");
        Self::launch::<T>(
            Role::Inbound,
            peer,
            binary,
            Some(host),
            Some(transport),
            None,
        )
    }

    /// Open an outbound session to `host:port`.
    ///
    /// The connector is kept for the lifetime of the session; the
    /// connect-timeout path uses it to reattach a fresh transport.
    pub fn connect<C>(connector: C, host: impl Into<String>, port: u16, ssl: bool) -> Self
    where
        C: Connector + 'static,
    {
        let endpoint = Endpoint::new(host, port, ssl);
        info!(url = %endpoint.url(), "connecting session");
        Self::launch::<C::Transport>(
            Role::Outbound,
            endpoint,
            true,
            None,
            None,
            Some(Box::new(connector)),
        )
    }

    fn launch<T: Transport>(
        role: Role,
        endpoint: Endpoint,
        binary: bool,
        host: Option<Arc<dyn ChannelHost>>,
        link: Option<T>,
        connector: Option<Box<dyn Connector<Transport = T>>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let shared = Arc::new(Shared {
            id: SocketId::next(),
            role,
            endpoint,
            binary,
            connected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            jobs: JobTable::new(),
            hooks: HookRegistry::new(),
            bus: EventBus::new(),
            channels: Mutex::new(HashSet::new()),
            host,
            cmd_tx,
            cancel: CancellationToken::new(),
        });
        let driver = Driver {
            shared: shared.clone(),
            cmd_rx,
            link,
            connector,
            parser: Parser::new(),
            assembling: None,
            buffer: VecDeque::new(),
            ping: PingState::new(Instant::now()),
            alive: true,
        };
        let _ = tokio::spawn(driver.run());
        Self { shared }
    }

    /// Session identifier.
    pub fn id(&self) -> SocketId {
        self.shared.id
    }

    /// Whether this session is inbound or outbound.
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Transport target (outbound) or peer address (inbound).
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Whether the peer accepts binary frames.
    pub fn binary(&self) -> bool {
        self.shared.binary
    }

    /// Whether the transport has reached the open state.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// Number of calls awaiting their ack.
    pub fn pending_calls(&self) -> usize {
        self.shared.jobs.len()
    }

    /// Register an application event listener.
    pub fn listen<F>(&self, name: &str, listener: F) -> Result<(), SocketError>
    where
        F: Fn(&[Value]) -> Result<(), RemoteError> + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.shared.bus.listen(name, listener)
    }

    /// Bind the RPC responder for `name`. A name has exactly one responder;
    /// rebinding is rejected.
    pub fn hook(&self, name: &str, hook: impl Hook + 'static) -> Result<(), SocketError> {
        self.ensure_live()?;
        self.shared.hooks.bind(name, Arc::new(hook))
    }

    /// Send a fire-and-forget event.
    pub async fn fire(&self, name: &str, args: Vec<Value>) -> Result<(), SocketError> {
        self.ensure_live()?;
        if is_reserved(name) {
            return Err(SocketError::ReservedName {
                name: name.to_owned(),
            });
        }
        self.send_command(Command::Packet(Packet::event(event_data(name, args))))
            .await
    }

    /// Call the peer's hook for `name` and await its result.
    ///
    /// Resolves with the hook's return value when the matching ack arrives;
    /// rejects when the hook failed, the job deadline passed, or the
    /// session was destroyed.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, SocketError> {
        self.ensure_live()?;
        let id = self.shared.jobs.next_id();
        let rx = self.shared.jobs.register(id)?;

        let mut packet = Packet::event(event_data(name, args));
        packet.id = i64::from(id);
        if let Err(err) = self.send_command(Command::Packet(packet)).await {
            self.shared.jobs.forget(id);
            return Err(err);
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SocketError::Destroyed),
        }
    }

    /// Whether this session is a member of `name`.
    pub fn channel(&self, name: &str) -> bool {
        self.shared.channels.lock().contains(name)
    }

    /// Join a channel. Delegates to the channel host; inbound only.
    pub fn join(&self, name: &str) -> Result<(), SocketError> {
        self.ensure_live()?;
        let host = self.shared.host.clone().ok_or(SocketError::NotInbound)?;
        host.join(self, name);
        Ok(())
    }

    /// Leave a channel. Delegates to the channel host; inbound only.
    pub fn leave(&self, name: &str) -> Result<(), SocketError> {
        self.ensure_live()?;
        let host = self.shared.host.clone().ok_or(SocketError::NotInbound)?;
        host.leave(self, name);
        Ok(())
    }

    /// Record channel membership. Called by the channel host.
    pub fn add_channel(&self, name: &str) {
        if !self.is_destroyed() {
            let _ = self.shared.channels.lock().insert(name.to_owned());
        }
    }

    /// Drop channel membership. Called by the channel host.
    pub fn remove_channel(&self, name: &str) {
        let _ = self.shared.channels.lock().remove(name);
    }

    /// Names of every channel this session is a member of.
    pub fn channels(&self) -> Vec<String> {
        self.shared.channels.lock().iter().cloned().collect()
    }

    /// Subscribe to the session reaching the open state.
    pub fn on_open<F: Fn() + Send + Sync + 'static>(&self, listener: F) {
        if !self.is_destroyed() {
            self.shared.bus.on_open(listener);
        }
    }

    /// Subscribe to session teardown. Fires exactly once, from
    /// [`destroy`](Self::destroy).
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, listener: F) {
        if !self.is_destroyed() {
            self.shared.bus.on_close(listener);
        }
    }

    /// Subscribe to session errors.
    pub fn on_error<F: Fn(&SocketError) + Send + Sync + 'static>(&self, listener: F) {
        if !self.is_destroyed() {
            self.shared.bus.on_error(listener);
        }
    }

    /// Tear the session down.
    ///
    /// Idempotent: the first call rejects all pending jobs, emits `close`
    /// exactly once, drops every listener and stops the driver. Errors
    /// surfacing after this point are swallowed.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(id = %self.shared.id, "destroying session");
        let _ = self.shared.jobs.reject_all();
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.bus.emit_close();
        self.shared.bus.clear();
        self.shared.cancel.cancel();
    }

    fn ensure_live(&self) -> Result<(), SocketError> {
        if self.is_destroyed() {
            Err(SocketError::Destroyed)
        } else {
            Ok(())
        }
    }

    async fn send_command(&self, command: Command) -> Result<(), SocketError> {
        self.shared
            .cmd_tx
            .send(command)
            .await
            .map_err(|_| SocketError::Destroyed)
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("connected", &self.is_connected())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Build the EVENT payload `[name, ...args]`.
fn event_data(name: &str, args: Vec<Value>) -> Value {
    let mut data = Vec::with_capacity(args.len() + 1);
    data.push(Value::String(name.to_owned()));
    data.extend(args);
    Value::Array(data)
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

struct Driver<T: Transport> {
    shared: Arc<Shared>,
    cmd_rx: mpsc::Receiver<Command>,
    link: Option<T>,
    connector: Option<Box<dyn Connector<Transport = T>>>,
    parser: Parser,
    assembling: Option<Packet>,
    buffer: VecDeque<Frame>,
    ping: PingState,
    alive: bool,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        if self.link.is_none() {
            self.attach().await;
        }
        let mut tick =
            tokio::time::interval_at(tokio::time::Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.alive {
            tokio::select! {
                () = self.shared.cancel.cancelled() => {
                    self.teardown().await;
                }
                Some(command) = self.cmd_rx.recv() => match command {
                    Command::Packet(packet) => self.send_packet(packet).await,
                },
                event = Self::link_recv(&mut self.link) => {
                    self.handle_link_event(event).await;
                }
                _ = tick.tick() => self.on_tick().await,
            }
        }
        debug!(id = %self.shared.id, "session driver stopped");
    }

    async fn link_recv(link: &mut Option<T>) -> TransportEvent {
        match link {
            Some(transport) => transport.recv().await,
            None => std::future::pending().await,
        }
    }

    // ── Outbound path ───────────────────────────────────────────────

    /// Queue a frame until open, write it afterwards.
    async fn send_frame(&mut self, frame: Frame) {
        if self.shared.connected.load(Ordering::SeqCst) {
            self.write(frame).await;
        } else {
            self.buffer.push_back(frame);
        }
    }

    /// Serialize a packet into one textual MESSAGE frame followed by its
    /// attachments as binary MESSAGE frames, through the buffered path.
    async fn send_packet(&mut self, packet: Packet) {
        let text = packet.to_string();
        let buffers = packet.buffers;
        self.send_frame(Frame::text(FrameKind::Message, text)).await;
        for bytes in buffers {
            self.send_frame(Frame::binary(FrameKind::Message, bytes)).await;
        }
    }

    /// Like [`send_packet`](Self::send_packet) but bypassing the pre-open
    /// buffer, for handshake traffic and ack replies.
    async fn write_packet(&mut self, packet: Packet) {
        let text = packet.to_string();
        let buffers = packet.buffers;
        self.write(Frame::text(FrameKind::Message, text)).await;
        for bytes in buffers {
            self.write(Frame::binary(FrameKind::Message, bytes)).await;
        }
    }

    /// Write a frame to the transport, raw when the peer accepts binary,
    /// textual otherwise.
    async fn write(&mut self, frame: Frame) {
        let Some(link) = self.link.as_mut() else {
            // Link went away mid-write; keep the frame for the next attach.
            self.buffer.push_back(frame);
            return;
        };
        let result = if frame.is_binary() && self.shared.binary {
            link.send_binary(frame.to_raw()).await
        } else {
            link.send_text(frame.to_text()).await
        };
        if result.is_err() {
            self.raise(SocketError::Transport {
                message: "transport send failed".to_owned(),
            });
            self.fail_link().await;
        }
    }

    // ── Transport events ────────────────────────────────────────────

    async fn handle_link_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_link_open().await,
            TransportEvent::Text(text) => match self.parser.feed_text(&text) {
                Ok(frame) => self.handle_frame(frame).await,
                Err(err) => self.raise(err.into()),
            },
            TransportEvent::Binary(bytes) => match self.parser.feed_binary(&bytes) {
                Ok(frame) => self.handle_frame(frame).await,
                Err(err) => self.raise(err.into()),
            },
            TransportEvent::Error(message) => {
                self.raise(SocketError::Transport { message });
                self.fail_link().await;
            }
            TransportEvent::Closed { code, reason } => {
                debug!(id = %self.shared.id, code, reason, "transport closed");
                if !is_clean_close(code) {
                    self.raise(SocketError::AbnormalClose { code, reason });
                }
                self.fail_link().await;
            }
        }
    }

    async fn on_link_open(&mut self) {
        debug!(id = %self.shared.id, role = ?self.shared.role, "transport open");
        self.ping.touch(Instant::now());
        if !self.shared.role.is_inbound() {
            // Outbound sessions send nothing unsolicited: the peer's OPEN
            // carries the ping parameters and its CONNECT takes us live.
            return;
        }

        // Greet: OPEN with the handshake parameters, then CONNECT.
        let interval_ms =
            u32::try_from(self.ping.ping_interval().as_millis()).unwrap_or(u32::MAX);
        let timeout_ms = u32::try_from(self.ping.ping_timeout().as_millis()).unwrap_or(u32::MAX);
        let payload = OpenPayload {
            sid: SESSION_ID.to_owned(),
            upgrades: Vec::new(),
            ping_interval: interval_ms,
            ping_timeout: timeout_ms,
        };
        let text = serde_json::to_string(&payload).unwrap_or_default();
        self.write(Frame::text(FrameKind::Open, text)).await;
        self.write_packet(Packet::new(PacketKind::Connect)).await;

        self.go_live().await;
    }

    /// Flush the pre-open buffer in FIFO order, mark the session connected
    /// and emit `open`.
    async fn go_live(&mut self) {
        while let Some(frame) = self.buffer.pop_front() {
            self.write(frame).await;
            if !self.alive || self.link.is_none() {
                return;
            }
        }

        self.shared.connected.store(true, Ordering::SeqCst);
        self.ping.touch(Instant::now());
        self.shared.bus.emit_open();
    }

    // ── Frame dispatch ──────────────────────────────────────────────

    /// Dispatch one frame. Errors are emitted on the session's error
    /// channel; they do not tear the session down unless a handler below
    /// explicitly does.
    async fn handle_frame(&mut self, frame: Frame) {
        if let Err(err) = self.dispatch_frame(frame).await {
            self.raise(err);
        }
    }

    async fn dispatch_frame(&mut self, frame: Frame) -> Result<(), SocketError> {
        // An in-progress packet claims every frame until its attachments
        // are complete.
        if self.assembling.is_some() {
            return self.reassemble(frame).await;
        }
        match frame.kind {
            FrameKind::Open => self.handle_open(frame),
            FrameKind::Close => {
                self.write(Frame::empty(FrameKind::Close)).await;
                self.fail_link().await;
                Ok(())
            }
            FrameKind::Ping => {
                self.write(Frame::empty(FrameKind::Pong)).await;
                Ok(())
            }
            FrameKind::Pong => {
                if !self.ping.pong() {
                    self.raise(SocketError::protocol("Unexpected pong."));
                    self.destroy_now().await;
                }
                Ok(())
            }
            FrameKind::Message => self.handle_message(frame).await,
            FrameKind::Upgrade => Err(SocketError::Upgrade),
            FrameKind::Noop => Ok(()),
        }
    }

    fn handle_open(&mut self, frame: Frame) -> Result<(), SocketError> {
        let FrameData::Text(text) = frame.data else {
            return Err(SocketError::protocol("OPEN frame must be textual."));
        };
        let payload: OpenPayload = serde_json::from_str(&text)
            .map_err(|err| SocketError::protocol(format!("Bad handshake payload: {err}")))?;
        debug!(
            id = %self.shared.id,
            ping_interval = payload.ping_interval,
            ping_timeout = payload.ping_timeout,
            "handshake received"
        );
        self.ping.configure(payload.ping_interval, payload.ping_timeout);
        Ok(())
    }

    async fn handle_message(&mut self, frame: Frame) -> Result<(), SocketError> {
        match frame.data {
            FrameData::Text(text) => {
                let packet: Packet = text.parse().map_err(SocketError::Wire)?;
                if packet.attachments > 0 {
                    self.assembling = Some(packet);
                    Ok(())
                } else {
                    self.dispatch_packet(packet).await
                }
            }
            FrameData::Binary(_) => Err(SocketError::protocol("Unexpected binary frame.")),
        }
    }

    async fn reassemble(&mut self, frame: Frame) -> Result<(), SocketError> {
        let bytes = match frame.data {
            FrameData::Binary(bytes) if frame.kind == FrameKind::Message => bytes,
            _ => return Err(SocketError::protocol("Expected a binary attachment frame.")),
        };
        if let Some(mut packet) = self.assembling.take() {
            packet.buffers.push(bytes);
            if packet.complete() {
                self.dispatch_packet(packet).await?;
            } else {
                self.assembling = Some(packet);
            }
        }
        Ok(())
    }

    // ── Packet dispatch ─────────────────────────────────────────────

    async fn dispatch_packet(&mut self, packet: Packet) -> Result<(), SocketError> {
        let id = packet.id;
        let data = packet.data();
        match packet.kind {
            PacketKind::Connect => {
                debug!(id = %self.shared.id, "peer connect");
                // Outbound sessions go live here, after the peer's OPEN has
                // delivered the ping parameters.
                if !self.shared.role.is_inbound()
                    && !self.shared.connected.load(Ordering::SeqCst)
                {
                    self.go_live().await;
                }
                Ok(())
            }
            PacketKind::Disconnect => {
                debug!(id = %self.shared.id, "peer disconnect");
                Ok(())
            }
            PacketKind::Event | PacketKind::BinaryEvent => self.handle_event(id, data).await,
            PacketKind::Ack | PacketKind::BinaryAck => self.handle_ack(id, data),
            PacketKind::Error => self.handle_error_packet(id, &data),
        }
    }

    async fn handle_event(&mut self, id: i64, data: Value) -> Result<(), SocketError> {
        let Value::Array(mut items) = data else {
            return Err(SocketError::protocol("Event payload must be an array."));
        };
        if items.is_empty() {
            return Err(SocketError::protocol("Event payload must not be empty."));
        }
        let args = items.split_off(1);
        let name = match items.into_iter().next() {
            Some(Value::String(name)) => name,
            _ => return Err(SocketError::protocol("Event name must be a string.")),
        };

        if id >= 0 {
            // Incoming call: route to the single hook and ack the result.
            let Some(hook) = self.shared.hooks.get(&name) else {
                return Err(SocketError::protocol(format!("No hook bound for {name:?}.")));
            };
            debug!(id = %self.shared.id, call = id, event = %name, "invoking hook");
            let reply = match hook.call(args).await {
                Ok(result) => json!([null, result]),
                Err(err) => json!([err.to_value()]),
            };
            self.write_packet(Packet::ack(id, reply)).await;
            Ok(())
        } else {
            if is_reserved(&name) {
                return Err(SocketError::ReservedName { name });
            }
            if let Err(err) = self.shared.bus.emit(&name, &args) {
                warn!(id = %self.shared.id, event = %name, error = %err, "listener failed");
                self.write_packet(Packet::error(err.to_value())).await;
            }
            Ok(())
        }
    }

    fn handle_ack(&mut self, id: i64, data: Value) -> Result<(), SocketError> {
        let id = u32::try_from(id)
            .map_err(|_| SocketError::protocol("Ack without a call id."))?;
        let (err, result) = match data {
            Value::Null => (None, Value::Null),
            Value::Array(items) => {
                let mut items = items.into_iter();
                (items.next(), items.next().unwrap_or(Value::Null))
            }
            _ => return Err(SocketError::protocol("Ack payload must be null or an array.")),
        };
        let outcome = match err {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(result),
            Some(value @ Value::Object(_)) => Err(RemoteError::from_value(&value)),
            Some(_) => return Err(SocketError::protocol("Ack error must be an object.")),
        };
        self.shared.jobs.complete(id, outcome)
    }

    fn handle_error_packet(&mut self, id: i64, data: &Value) -> Result<(), SocketError> {
        if id >= 0 {
            return Err(SocketError::protocol("Error packet with a call id."));
        }
        if !data.is_object() {
            return Err(SocketError::protocol("Error packet payload must be an object."));
        }
        self.raise(SocketError::Remote(RemoteError::from_value(data)));
        Ok(())
    }

    // ── Liveness ────────────────────────────────────────────────────

    async fn on_tick(&mut self) {
        let connected = self.shared.connected.load(Ordering::SeqCst);
        if connected {
            let expired = self.shared.jobs.expire(JOB_TIMEOUT);
            if expired > 0 {
                warn!(id = %self.shared.id, expired, "rejected expired jobs");
            }
        }
        match self.ping.on_tick(connected, Instant::now()) {
            TickAction::Idle => {}
            TickAction::SendPing => {
                self.write(Frame::empty(FrameKind::Ping)).await;
            }
            TickAction::ConnectTimedOut => {
                self.raise(SocketError::ConnectTimeout);
                if self.shared.role.is_inbound() {
                    self.destroy_now().await;
                } else {
                    self.reconnect().await;
                }
            }
            TickAction::Stalled => {
                warn!(id = %self.shared.id, "ping challenge unanswered");
                self.raise(SocketError::Stalling);
                self.fail_link().await;
            }
        }
    }

    // ── Teardown & reattach ─────────────────────────────────────────

    /// Role split shared by transport failures, CLOSE frames and stalls:
    /// inbound sessions are destroyed, outbound sessions close the link and
    /// wait for the connect-timeout path to reattach.
    async fn fail_link(&mut self) {
        if self.shared.role.is_inbound() {
            self.destroy_now().await;
        } else {
            self.close_link().await;
        }
    }

    /// Reset the session to its pre-open state without emitting `close`.
    async fn close_link(&mut self) {
        self.assembling = None;
        self.shared.connected.store(false, Ordering::SeqCst);
        self.ping.reset(Instant::now());
        self.shared.jobs.reset_sequence();
        let rejected = self.shared.jobs.reject_all();
        if rejected > 0 {
            debug!(id = %self.shared.id, rejected, "rejected jobs on close");
        }
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    async fn destroy_now(&mut self) {
        self.teardown().await;
        Socket {
            shared: self.shared.clone(),
        }
        .destroy();
    }

    async fn teardown(&mut self) {
        self.buffer.clear();
        self.close_link().await;
        self.alive = false;
    }

    async fn reconnect(&mut self) {
        info!(id = %self.shared.id, url = %self.shared.endpoint.url(), "reattaching transport");
        self.close_link().await;
        self.attach().await;
    }

    async fn attach(&mut self) {
        let Some(connector) = self.connector.as_ref() else {
            return;
        };
        self.ping.touch(Instant::now());
        match connector.connect(&self.shared.endpoint).await {
            Ok(link) => {
                self.parser = Parser::new();
                self.link = Some(link);
            }
            Err(err) => {
                self.raise(SocketError::Transport {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Surface an error on the session's error channel. Dropped silently
    /// once the session is destroyed.
    fn raise(&self, error: SocketError) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            debug!(id = %self.shared.id, %error, "error after destroy, swallowed");
            return;
        }
        self.shared.bus.emit_error(&error);
    }
}
