//! Application event bus and lifecycle listeners.
//!
//! Application events are keyed by name; a short blacklist keeps the
//! session's own lifecycle names (and the usual emitter bookkeeping names)
//! out of the application namespace. Lifecycle subscriptions go through
//! dedicated `on_open` / `on_close` / `on_error` lists instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::error::{RemoteError, SocketError};

/// Names that can never be used as application event names.
pub const RESERVED_EVENTS: &[&str] = &[
    "open",
    "close",
    "error",
    "newListener",
    "removeListener",
];

/// Whether `name` is barred from the application namespace.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

/// Application event listener. A returned error is reported back to the
/// peer via an ERROR packet.
pub type Listener = dyn Fn(&[Value]) -> Result<(), RemoteError> + Send + Sync;

type LifecycleListener = dyn Fn() + Send + Sync;
type ErrorListener = dyn Fn(&SocketError) + Send + Sync;

/// Listener registry for one session.
#[derive(Default)]
pub struct EventBus {
    app: RwLock<HashMap<String, Vec<Arc<Listener>>>>,
    open: RwLock<Vec<Arc<LifecycleListener>>>,
    close: RwLock<Vec<Arc<LifecycleListener>>>,
    error: RwLock<Vec<Arc<ErrorListener>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application listener for `name`.
    pub fn listen<F>(&self, name: &str, listener: F) -> Result<(), SocketError>
    where
        F: Fn(&[Value]) -> Result<(), RemoteError> + Send + Sync + 'static,
    {
        if is_reserved(name) {
            return Err(SocketError::ReservedName {
                name: name.to_owned(),
            });
        }
        self.app
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(Arc::new(listener));
        Ok(())
    }

    /// Dispatch an application event.
    ///
    /// Listeners run in registration order; the first failure stops
    /// dispatch and is returned to the caller.
    pub fn emit(&self, name: &str, args: &[Value]) -> Result<(), RemoteError> {
        let listeners = match self.app.read().get(name) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };
        for listener in listeners {
            listener(args)?;
        }
        Ok(())
    }

    /// Number of application listeners for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.app.read().get(name).map_or(0, Vec::len)
    }

    /// Register a listener for the session reaching the open state.
    pub fn on_open<F: Fn() + Send + Sync + 'static>(&self, listener: F) {
        self.open.write().push(Arc::new(listener));
    }

    /// Register a listener for session teardown.
    pub fn on_close<F: Fn() + Send + Sync + 'static>(&self, listener: F) {
        self.close.write().push(Arc::new(listener));
    }

    /// Register a listener for session errors.
    pub fn on_error<F: Fn(&SocketError) + Send + Sync + 'static>(&self, listener: F) {
        self.error.write().push(Arc::new(listener));
    }

    /// Notify open listeners.
    pub fn emit_open(&self) {
        for listener in self.open.read().clone() {
            listener();
        }
    }

    /// Notify close listeners.
    pub fn emit_close(&self) {
        for listener in self.close.read().clone() {
            listener();
        }
    }

    /// Notify error listeners. An error with nobody listening is logged so
    /// it does not vanish silently.
    pub fn emit_error(&self, error: &SocketError) {
        let listeners = self.error.read().clone();
        if listeners.is_empty() {
            warn!(%error, "session error with no error listener");
            return;
        }
        for listener in listeners {
            listener(error);
        }
    }

    /// Drop every registered listener.
    pub fn clear(&self) {
        self.app.write().clear();
        self.open.write().clear();
        self.close.write().clear();
        self.error.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reserved_names() {
        assert!(is_reserved("error"));
        assert!(is_reserved("newListener"));
        assert!(!is_reserved("chat"));
    }

    #[test]
    fn listen_rejects_reserved_names() {
        let bus = EventBus::new();
        for name in RESERVED_EVENTS {
            let result = bus.listen(name, |_| Ok(()));
            assert!(matches!(result, Err(SocketError::ReservedName { .. })));
        }
    }

    #[test]
    fn emit_reaches_listeners_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(RwLock::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            bus.listen("ping", move |args| {
                seen.write().push((tag, args[0].clone()));
                Ok(())
            })
            .unwrap();
        }

        bus.emit("ping", &[json!(1)]).unwrap();
        assert_eq!(
            *seen.read(),
            vec![("a", json!(1)), ("b", json!(1))]
        );
    }

    #[test]
    fn emit_without_listeners_is_ok() {
        let bus = EventBus::new();
        assert!(bus.emit("nobody", &[]).is_ok());
    }

    #[test]
    fn emit_stops_at_first_failure() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.listen("boom", |_| Err(RemoteError::new("first failed")))
            .unwrap();
        let reached2 = reached.clone();
        bus.listen("boom", move |_| {
            let _ = reached2.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        let err = bus.emit("boom", &[]).unwrap_err();
        assert_eq!(err.message, "first failed");
        assert_eq!(reached.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn lifecycle_listeners_fire() {
        let bus = EventBus::new();
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let o = opens.clone();
        bus.on_open(move || {
            let _ = o.fetch_add(1, Ordering::Relaxed);
        });
        let c = closes.clone();
        bus.on_close(move || {
            let _ = c.fetch_add(1, Ordering::Relaxed);
        });
        let e = errors.clone();
        bus.on_error(move |_| {
            let _ = e.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit_open();
        bus.emit_close();
        bus.emit_error(&SocketError::JobTimeout);

        assert_eq!(opens.load(Ordering::Relaxed), 1);
        assert_eq!(closes.load(Ordering::Relaxed), 1);
        assert_eq!(errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn emit_error_without_listeners_does_not_panic() {
        let bus = EventBus::new();
        bus.emit_error(&SocketError::JobTimeout);
    }

    #[test]
    fn clear_removes_everything() {
        let bus = EventBus::new();
        bus.listen("chat", |_| Ok(())).unwrap();
        bus.on_close(|| {});
        bus.clear();
        assert_eq!(bus.listener_count("chat"), 0);
        // Close after clear reaches nobody
        bus.emit_close();
    }
}
