//! Channel membership seam between sessions and the owning server.

use crate::socket::Socket;

/// The server-side object that tracks channel membership.
///
/// Accepted sessions delegate [`Socket::join`] / [`Socket::leave`] here; the
/// host is expected to maintain its own channel → members index and to
/// mirror membership back onto the socket via [`Socket::add_channel`] /
/// [`Socket::remove_channel`].
pub trait ChannelHost: Send + Sync {
    /// Add `socket` to `channel`.
    fn join(&self, socket: &Socket, channel: &str);

    /// Remove `socket` from `channel`.
    fn leave(&self, socket: &Socket, channel: &str);
}
