//! Named entry points for host-invoked handlers.
//!
//! After a cold start the host only knows a task *name*. The embedding app
//! registers its handler under that name during process start-up, before the
//! host delivers any queued signal, and the host glue dispatches by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use super::geofence::TransitionOutcome;
use super::signal::RawSignal;

/// A handler the host can invoke by name.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    /// Processes one signal. Never panics or propagates errors.
    async fn handle(&self, signal: RawSignal) -> TransitionOutcome;
}

/// Name → handler table.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TransitionHandler>>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `name`.
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn TransitionHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers.insert(name.into(), handler);
    }

    /// Whether a handler is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    /// Delivers `signal` to the handler registered under `name`.
    ///
    /// Returns `None` (and logs) when nothing is registered.
    pub async fn dispatch(&self, name: &str, signal: RawSignal) -> Option<TransitionOutcome> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned();

        match handler {
            Some(handler) => Some(handler.handle(signal).await),
            None => {
                warn!(task = name, "signal for unregistered task dropped");
                None
            }
        }
    }
}
