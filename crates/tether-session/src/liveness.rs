//! Liveness timing: connect timeout, ping challenge, stall detection.

use std::time::Duration;

use tokio::time::Instant;

/// Cadence of the liveness tick.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// How long a session may sit unconnected before the timeout path fires.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard deadline for a pending call.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Default ping interval advertised in the handshake.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

/// Default ping timeout advertised in the handshake.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(60);

/// What the liveness tick decided to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickAction {
    /// Nothing due this tick.
    Idle,
    /// The session never reached the open state in time.
    ConnectTimedOut,
    /// Send a ping challenge.
    SendPing,
    /// An outstanding challenge went unanswered past the ping timeout.
    Stalled,
}

/// Liveness bookkeeping for one session.
///
/// The tick runs every [`TICK_INTERVAL`] regardless of the negotiated ping
/// interval, so the effective ping cadence is `min(tick, ping_timeout)`.
#[derive(Debug)]
pub struct PingState {
    ping_interval: Duration,
    ping_timeout: Duration,
    challenge: bool,
    last_ping: Instant,
    last_transition: Instant,
}

impl PingState {
    /// Fresh state with the default ping parameters.
    pub fn new(now: Instant) -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            challenge: false,
            last_ping: now,
            last_transition: now,
        }
    }

    /// Record a session state transition (used by the connect timeout).
    pub fn touch(&mut self, now: Instant) {
        self.last_transition = now;
    }

    /// Adopt the peer's handshake parameters (milliseconds).
    pub fn configure(&mut self, ping_interval_ms: u32, ping_timeout_ms: u32) {
        self.ping_interval = Duration::from_millis(u64::from(ping_interval_ms));
        self.ping_timeout = Duration::from_millis(u64::from(ping_timeout_ms));
    }

    /// Negotiated ping interval.
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Negotiated ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Whether a challenge is outstanding.
    pub fn challenged(&self) -> bool {
        self.challenge
    }

    /// Record an answered challenge. Returns `false` when no challenge was
    /// outstanding, which the caller must treat as a protocol violation.
    pub fn pong(&mut self) -> bool {
        if self.challenge {
            self.challenge = false;
            true
        } else {
            false
        }
    }

    /// Clear challenge state (link teardown).
    pub fn reset(&mut self, now: Instant) {
        self.challenge = false;
        self.last_ping = now;
        self.last_transition = now;
    }

    /// Run one liveness tick.
    pub fn on_tick(&mut self, connected: bool, now: Instant) -> TickAction {
        if !connected {
            if now.duration_since(self.last_transition) > CONNECT_TIMEOUT {
                return TickAction::ConnectTimedOut;
            }
            return TickAction::Idle;
        }
        if !self.challenge {
            self.challenge = true;
            self.last_ping = now;
            return TickAction::SendPing;
        }
        if now.duration_since(self.last_ping) > self.ping_timeout {
            return TickAction::Stalled;
        }
        TickAction::Idle
    }
}
