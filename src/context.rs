//! The persisted "active event" context.
//!
//! The transition handler may start in a brand-new process, so the event it
//! attributes transitions to is read from storage on every invocation. Absence
//! is always represented by a missing key, never by an empty string.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::time::{iso_millis, Clock};

/// Persisted identity and expiry of the armed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEventMeta {
    /// Never blank once persisted.
    pub event_id: String,
    /// End of the attendance window; `None` when unknown.
    #[serde(default, with = "iso_millis::option")]
    pub active_event_end_utc: Option<DateTime<Utc>>,
    /// When this context was written.
    #[serde(with = "iso_millis")]
    pub saved_at: DateTime<Utc>,
}

impl ActiveEventMeta {
    /// True if the window has a known end that lies strictly before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.active_event_end_utc.is_some_and(|end| now > end)
    }
}

/// Called when a read finds the context expired.
///
/// The monitor installs a hook that unregisters the platform region, so an
/// attendance window that ends stops background monitoring even if the UI
/// never disarms.
#[async_trait]
pub trait ExpiryHook: Send + Sync {
    /// Best-effort reaction to `event_id` expiring. Must not panic.
    async fn on_expired(&self, event_id: &str);
}

/// Store-backed active event slot.
pub struct ActiveEventContext {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    expiry_hook: Option<Arc<dyn ExpiryHook>>,
}

impl ActiveEventContext {
    /// Creates a context without an expiry hook.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            expiry_hook: None,
        }
    }

    /// Installs the hook run when the context auto-expires.
    #[must_use]
    pub fn with_expiry_hook(mut self, hook: Arc<dyn ExpiryHook>) -> Self {
        self.expiry_hook = Some(hook);
        self
    }

    /// Arms the context for `event_id`.
    ///
    /// Blank ids are ignored. Re-arming the same event with an unknown end
    /// keeps the previously known end instead of erasing it.
    pub fn set_active_event(&self, event_id: &str, end_utc: Option<DateTime<Utc>>) {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            debug!("ignoring active event with blank id");
            return;
        }

        let end_utc = end_utc.or_else(|| {
            self.stored_meta()
                .filter(|existing| existing.event_id == event_id)
                .and_then(|existing| existing.active_event_end_utc)
        });

        let meta = ActiveEventMeta {
            event_id: event_id.to_string(),
            active_event_end_utc: end_utc,
            saved_at: self.clock.now(),
        };
        write_json(self.store.as_ref(), keys::ACTIVE_EVENT_META, &meta);
    }

    /// Removes the context (current and legacy keys). Idempotent.
    pub fn clear_active_event(&self) {
        self.store.delete_best_effort(keys::ACTIVE_EVENT_META);
        self.store.delete_best_effort(keys::LEGACY_ACTIVE_EVENT_ID);
    }

    /// Resolves the armed event id, enforcing expiry.
    ///
    /// An expired context is cleared, the expiry hook runs, and `None` is
    /// returned. Never returns a blank string.
    pub async fn get_active_event_id(&self) -> Option<String> {
        let meta = self.current()?;

        if meta.is_expired_at(self.clock.now()) {
            info!(event_id = %meta.event_id, "active event window ended; clearing context");
            self.clear_active_event();
            if let Some(hook) = &self.expiry_hook {
                hook.on_expired(&meta.event_id).await;
            }
            return None;
        }

        Some(meta.event_id)
    }

    /// Reads the context without enforcing expiry.
    ///
    /// Falls back to the legacy single-string key written by older builds;
    /// a legacy id carries no known end.
    pub fn current(&self) -> Option<ActiveEventMeta> {
        if let Some(meta) = self.stored_meta() {
            return Some(meta);
        }

        let legacy = self.store.get_best_effort(keys::LEGACY_ACTIVE_EVENT_ID)?;
        let legacy = legacy.trim();
        if legacy.is_empty() {
            return None;
        }
        Some(ActiveEventMeta {
            event_id: legacy.to_string(),
            active_event_end_utc: None,
            saved_at: self.clock.now(),
        })
    }

    fn stored_meta(&self) -> Option<ActiveEventMeta> {
        read_json::<ActiveEventMeta>(self.store.as_ref(), keys::ACTIVE_EVENT_META)
            .filter(|meta| !meta.event_id.trim().is_empty())
    }
}
