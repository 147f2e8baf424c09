//! Stable device label written into every transition record.

use crate::storage::{keys, KeyValueStore};
use tracing::warn;
use uuid::Uuid;

/// Resolves the device label.
///
/// A configured label wins. Otherwise a UUID is generated on first use and
/// persisted so every later invocation, in any process, reports the same one.
/// If the write fails the generated id is still returned for this invocation.
pub fn resolve_device_label(store: &dyn KeyValueStore, configured: Option<&str>) -> String {
    if let Some(label) = configured.map(str::trim).filter(|l| !l.is_empty()) {
        return label.to_string();
    }

    if let Some(existing) = store.get_best_effort(keys::DEVICE_ID) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }

    let generated = Uuid::new_v4().to_string();
    if !store.set_best_effort(keys::DEVICE_ID, &generated) {
        warn!("device id not persisted; records from later invocations may carry a different id");
    }
    generated
}
