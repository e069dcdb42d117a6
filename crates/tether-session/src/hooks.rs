//! RPC responder registry: exactly one hook per event name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{RemoteError, SocketError};
use crate::events::is_reserved;

/// Handler for incoming calls.
///
/// The handler is awaited before the ACK reply is produced; a returned
/// error travels back to the caller as the ACK error payload.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Execute the hook with the call arguments (event name excluded).
    async fn call(&self, args: Vec<Value>) -> Result<Value, RemoteError>;
}

/// Adapter turning a plain function into a [`Hook`].
pub struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(Vec<Value>) -> Result<Value, RemoteError> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, RemoteError> {
        (self.f)(args)
    }
}

/// Wrap a synchronous function as a [`Hook`].
pub fn hook_fn<F>(f: F) -> FnHook<F>
where
    F: Fn(Vec<Value>) -> Result<Value, RemoteError> + Send + Sync,
{
    FnHook { f }
}

/// Registry mapping event names to their single responder.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Arc<dyn Hook>>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a hook for `name`.
    ///
    /// Reserved names and rebinding are rejected; a name has at most one
    /// responder for its lifetime.
    pub fn bind(&self, name: &str, hook: Arc<dyn Hook>) -> Result<(), SocketError> {
        if is_reserved(name) {
            return Err(SocketError::ReservedName {
                name: name.to_owned(),
            });
        }
        let mut hooks = self.hooks.write();
        if hooks.contains_key(name) {
            return Err(SocketError::DuplicateHook {
                name: name.to_owned(),
            });
        }
        let _ = hooks.insert(name.to_owned(), hook);
        Ok(())
    }

    /// Look up the hook for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.read().get(name).cloned()
    }

    /// Whether a hook is bound for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.read().contains_key(name)
    }

    /// Number of bound hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no hooks are bound.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}
