//! Transport seam: the interface the session consumes from a WebSocket-like
//! duplex, plus the connector used to (re)establish outbound links.

use std::io;

use async_trait::async_trait;

/// Event delivered by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is ready for traffic.
    Open,
    /// A textual message arrived.
    Text(String),
    /// A binary message arrived.
    Binary(Vec<u8>),
    /// The transport failed.
    Error(String),
    /// The transport closed.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Errors returned by transport send operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is no longer writable.
    #[error("transport closed")]
    Closed,
}

/// A duplex message stream owned exclusively by one session.
///
/// Implementations wrap a real WebSocket (or the in-memory pair from
/// [`crate::memory`]). The session consumes events via [`recv`] and never
/// touches the transport again after requesting [`close`], so late events
/// cannot re-enter a torn-down session.
///
/// [`recv`]: Transport::recv
/// [`close`]: Transport::close
#[async_trait]
pub trait Transport: Send + 'static {
    /// Wait for the next transport event.
    async fn recv(&mut self) -> TransportEvent;

    /// Send a textual message.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a binary message.
    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Request a clean close.
    async fn close(&mut self);
}

/// Factory for outbound transports.
///
/// Called once when the session is created and again by the
/// connect-timeout path each time the link needs to be reattached.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The transport type produced by this connector.
    type Transport: Transport;

    /// Establish a new link to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Transport>;
}

/// Outbound target (or, for accepted sessions, the peer address).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Whether to use TLS.
    pub ssl: bool,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16, ssl: bool) -> Self {
        Self {
            host: host.into(),
            port,
            ssl,
        }
    }

    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/socket.io/?transport=websocket",
            self.host, self.port
        )
    }
}

/// Upgrade request data for an accepted session.
///
/// The surrounding HTTP machinery is out of scope; the session only needs
/// the path and raw query string of the upgrade request.
#[derive(Clone, Debug, Default)]
pub struct Handshake {
    /// Request path, e.g. `/socket.io/`.
    pub path: String,
    /// Raw query string, e.g. `transport=websocket&b64=1`.
    pub query: String,
}

impl Handshake {
    /// Create a handshake from a path and raw query string.
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }

    /// Whether the peer requires base64 textual frames (`b64=1`).
    pub fn wants_base64(&self) -> bool {
        url::form_urlencoded::parse(self.query.as_bytes())
            .any(|(key, value)| key == "b64" && value == "1")
    }
}
