//! Persisted key namespace.
//!
//! These strings are read by every released version of the engine; renaming
//! one orphans the data stored under it.

/// Serialized `ActiveEventMeta`.
pub const ACTIVE_EVENT_META: &str = "geoproof.active_event_meta.v1";

/// Bare event id written by builds that predate `ActiveEventMeta`.
pub const LEGACY_ACTIVE_EVENT_ID: &str = "geoproof.active_event_id";

/// Serialized `LastTransitionMarker`.
pub const LAST_TRANSITION: &str = "geoproof.last_transition";

/// JSON array of undelivered `TransitionRecord`s, oldest first.
pub const OFFLINE_QUEUE: &str = "geoproof.offline_queue";

/// Generated per-installation device id.
pub const DEVICE_ID: &str = "geoproof.device_id";

/// All keys owned by the engine.
pub const ALL: [&str; 5] = [
    ACTIVE_EVENT_META,
    LEGACY_ACTIVE_EVENT_ID,
    LAST_TRANSITION,
    OFFLINE_QUEUE,
    DEVICE_ID,
];
