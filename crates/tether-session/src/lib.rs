//! # tether-session
//!
//! Session core of the tether RPC-over-WebSocket protocol: one [`Socket`]
//! per WebSocket endpoint, carrying both fire-and-forget events and
//! correlated request/response calls over a single transport.
//!
//! The crate provides:
//!
//! - **Session state machine**: handshake → connected → stall/close, for
//!   both accepted ([`Socket::accept`]) and initiated ([`Socket::connect`])
//!   sessions
//! - **Frame/packet dispatch** with binary-attachment reassembly
//! - **RPC correlation**: [`Socket::call`] futures matched to acks through
//!   a pending-job table; incoming calls routed to [`Hook`] responders
//! - **Liveness**: periodic ping challenge, connect timeout, job expiry and
//!   stall detection
//! - **Transport seam**: the [`Transport`]/[`Connector`] traits a real
//!   WebSocket binding implements, plus an in-memory pair in [`memory`]
//!
//! The frame and packet codecs live in `tether-wire`.

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod hooks;
pub mod jobs;
pub mod liveness;
pub mod memory;
pub mod server;
pub mod socket;
pub mod transport;

pub use error::{close_code_name, ErrorCode, RemoteError, SocketError};
pub use events::{is_reserved, EventBus, RESERVED_EVENTS};
pub use hooks::{hook_fn, Hook, HookRegistry};
pub use jobs::JobTable;
pub use liveness::{
    DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT, CONNECT_TIMEOUT, JOB_TIMEOUT, TICK_INTERVAL,
};
pub use server::ChannelHost;
pub use socket::{Role, Socket, SocketId, SESSION_ID};
pub use transport::{Connector, Endpoint, Handshake, Transport, TransportError, TransportEvent};
