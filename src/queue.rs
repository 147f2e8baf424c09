//! Durable FIFO of undelivered transition records.
//!
//! Order matters to the ledger: an EXIT only makes sense after its ENTER has
//! been acknowledged, so a flush pass stops at the first failed delivery
//! instead of skipping ahead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::idempotency;
use crate::region::Direction;
use crate::storage::{keys, write_json, KeyValueStore};
use crate::time::iso_millis;

/// One geofence transition on its way to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    /// Never blank.
    pub event_id: String,
    /// Crossing direction.
    pub dir: Direction,
    /// When the handler processed the transition.
    #[serde(with = "iso_millis")]
    pub at: DateTime<Utc>,
    /// Host region identifier, if the signal carried one.
    pub region_id: Option<String>,
    /// Reported horizontal accuracy.
    pub accuracy_meters: Option<f64>,
    /// Device label.
    pub device: String,
    /// Idempotency key; never blank.
    pub idem: String,
}

impl TransitionRecord {
    /// Builds a record with a freshly derived idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventId` for a blank event id; a record
    /// without an event is never constructed.
    pub fn new(
        event_id: &str,
        dir: Direction,
        at: DateTime<Utc>,
        region_id: Option<String>,
        accuracy_meters: Option<f64>,
        device: impl Into<String>,
        window_secs: i64,
    ) -> Result<Self, ValidationError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(ValidationError::EmptyEventId);
        }
        let idem = idempotency::derive_with_window(event_id, region_id.as_deref(), dir, at, window_secs);
        Ok(Self {
            event_id: event_id.to_string(),
            dir,
            at,
            region_id,
            accuracy_meters: accuracy_meters.filter(|a| a.is_finite() && *a >= 0.0),
            device: device.into(),
            idem,
        })
    }

    fn is_well_formed(&self) -> bool {
        !self.event_id.trim().is_empty() && !self.idem.trim().is_empty()
    }
}

/// Delivers one record; `true` means the ledger holds it.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Attempts delivery. Must not panic; failures return `false`.
    async fn deliver(&self, record: &TransitionRecord) -> bool;
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records delivered and removed.
    pub delivered: usize,
    /// Records still queued.
    pub remaining: usize,
    /// True if the pass stopped on a failed delivery.
    pub halted: bool,
}

/// Store-backed FIFO queue.
///
/// The in-process mutex serialises enqueue and flush; cross-process
/// coordination relies on the store being the single writer's.
pub struct SyncQueue {
    store: Arc<dyn KeyValueStore>,
    guard: Mutex<()>,
}

impl SyncQueue {
    /// Creates a queue over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Appends a record. A record whose `idem` is already queued is not added
    /// twice. Returns whether the queue changed and was persisted.
    pub async fn enqueue(&self, record: TransitionRecord) -> bool {
        let _guard = self.guard.lock().await;
        let mut pending = self.load();

        if pending.iter().any(|queued| queued.idem == record.idem) {
            debug!(idem = %record.idem, "record already queued");
            return false;
        }

        pending.push(record);
        self.save(&pending)
    }

    /// Delivers queued records oldest-first.
    ///
    /// Each delivered record is removed (and the removal persisted) before the
    /// next is attempted. The pass stops at the first failure, leaving that
    /// record and everything after it queued.
    pub async fn flush_once(&self, deliverer: &dyn Deliver) -> FlushReport {
        let _guard = self.guard.lock().await;
        let mut pending = self.load();
        let mut report = FlushReport::default();

        while let Some(record) = pending.first() {
            if !deliverer.deliver(record).await {
                debug!(idem = %record.idem, "flush halted on failed delivery");
                report.halted = true;
                break;
            }
            pending.remove(0);
            report.delivered += 1;
            self.save(&pending);
        }

        report.remaining = pending.len();
        report
    }

    /// Number of queued records.
    pub async fn len(&self) -> usize {
        let _guard = self.guard.lock().await;
        self.load().len()
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the queued records, oldest first.
    pub async fn records(&self) -> Vec<TransitionRecord> {
        let _guard = self.guard.lock().await;
        self.load()
    }

    /// Decodes the stored queue, dropping entries that no longer parse or
    /// violate the record invariants instead of discarding the whole list.
    fn load(&self) -> Vec<TransitionRecord> {
        let Some(raw) = self.store.get_best_effort(keys::OFFLINE_QUEUE) else {
            return Vec::new();
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "offline queue is not a JSON array; ignoring it");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<TransitionRecord>(entry) {
                Ok(record) if record.is_well_formed() => Some(record),
                Ok(_) => {
                    warn!("dropping queued record without event id or idempotency key");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "dropping undecodable queued record");
                    None
                }
            })
            .collect()
    }

    fn save(&self, pending: &[TransitionRecord]) -> bool {
        if pending.is_empty() {
            self.store.delete_best_effort(keys::OFFLINE_QUEUE)
        } else {
            write_json(self.store.as_ref(), keys::OFFLINE_QUEUE, &pending)
        }
    }
}
