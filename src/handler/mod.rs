//! Request handlers and their thread-safe registry
//!
//! Handlers are opaque capabilities supplied by the rest of the agent. The
//! registry is append-only and insertion-ordered; every registered handler is
//! invoked for every inbound message.

use crate::error::HandlerError;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

pub mod dispatch;

pub use dispatch::MessageDispatcher;

/// Maximum size of an encoded handler response. Larger responses are a
/// processing failure, not silently truncated.
pub const MAX_RESPONSE_LEN: usize = 1024 * 1024;

/// Generic decoded request payload
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
    /// Subject to publish the response to; empty means no reply expected
    #[serde(default)]
    pub reply_to: String,
}

/// Business-logic callback: decode a request, produce a response value or
/// nothing, or fail. The bus layer never inspects its internals.
pub type HandlerFunc =
    Arc<dyn Fn(Request) -> Result<Option<serde_json::Value>, HandlerError> + Send + Sync>;

/// Thread-safe ordered collection of registered handlers
///
/// The mutex covers exactly the append and the snapshot copy; handlers are
/// always invoked outside the lock so a slow handler never blocks
/// registration or other deliveries' snapshots.
#[derive(Default)]
pub struct HandlerRegistry {
    funcs: Mutex<Vec<HandlerFunc>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; insertion order is preserved for delivery
    pub fn add(&self, func: HandlerFunc) {
        self.funcs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(func);
    }

    /// Copy the current handler list. Callers iterate the copy with the lock
    /// released.
    pub fn snapshot(&self) -> Vec<HandlerFunc> {
        self.funcs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.funcs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
