//! # geoproof - Geofence-based attendance verification
//!
//! geoproof records when a device enters or leaves the area around an
//! event, and delivers those transitions to a remote attendance ledger.
//! It is built to run inside a host's background geofencing callback,
//! which may start in a fresh process with no UI state.
//!
//! ## Core Concepts
//!
//! - **Active event context**: the event currently armed, with an optional
//!   end time after which it clears itself
//! - **Transition record**: one ENTER or EXIT, carrying an idempotency key
//!   so retries never double-count
//! - **Debounce**: same-direction repeats inside a short window are dropped
//! - **Offline queue**: records that could not be delivered wait in the
//!   key-value store and are flushed in order later
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geoproof::{ArmRequest, GeofenceMonitor, InMemoryKeyValueStore, RawSignal};
//! use std::sync::Arc;
//!
//! let monitor = GeofenceMonitor::builder(Arc::new(InMemoryKeyValueStore::new()), platform, ledger)
//!     .build()?;
//! monitor.arm(ArmRequest::new("E1", 52.52, 13.405, 150.0)).await?;
//!
//! // Later, from the host's background callback:
//! monitor.on_transition(RawSignal::enter("event:E1")).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod region;
pub mod time;

// State kept in the key-value store
pub mod context;
pub mod debounce;
pub mod device;
pub mod idempotency;
pub mod queue;
pub mod storage;

// Delivery and orchestration
pub mod monitor;
pub mod sync;
pub mod telemetry;

pub use config::{GeoproofConfig, DEBOUNCE_WINDOW_SECS, DEFAULT_TASK_NAME};
pub use context::{ActiveEventContext, ActiveEventMeta, ExpiryHook};
pub use debounce::{Debouncer, LastTransitionMarker};
pub use error::{GeoproofError, GeoproofResult, PermissionError, PlatformError, ValidationError};
pub use monitor::{
    ArmRequest, GeofenceMonitor, LocationPlatform, MonitorStatus, Notifier, PermissionStatus, RawSignal,
    SignalKind, TaskRegistry, TransitionHandler, TransitionOutcome,
};
pub use queue::{Deliver, FlushReport, SyncQueue, TransitionRecord};
pub use region::{Coordinate, Direction, GeofenceRegion};
pub use storage::{InMemoryKeyValueStore, KeyValueStore, StorageError};
pub use sync::{DeliveryPath, LedgerError, RemoteLedger, ServerSync};
pub use time::{Clock, ManualClock, SystemClock};

#[cfg(feature = "persistent")]
pub use storage::{open_store, PersistentConfig, PersistentKeyValueStore};
#[cfg(feature = "http")]
pub use sync::http::{HttpLedger, LedgerConfig};
