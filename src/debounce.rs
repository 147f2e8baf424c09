//! Same-direction debounce for boundary jitter.
//!
//! Near the radius edge the host can report ENTER/EXIT/ENTER in quick
//! succession. Only a repeat of the *same* direction inside the window is
//! suppressed; an ENTER followed by an EXIT always passes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEBOUNCE_WINDOW_SECS;
use crate::region::Direction;
use crate::storage::{keys, read_json, write_json, KeyValueStore};
use crate::time::{iso_millis, Clock};

/// The last processed transition, overwritten on every non-suppressed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTransitionMarker {
    /// Direction of the last processed transition.
    pub direction: Direction,
    /// When it was processed.
    #[serde(with = "iso_millis")]
    pub at: DateTime<Utc>,
}

/// Store-backed debouncer.
pub struct Debouncer {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl Debouncer {
    /// Creates a debouncer with the standard window.
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_window(store, clock, DEBOUNCE_WINDOW_SECS)
    }

    /// Creates a debouncer with a custom window in seconds.
    pub fn with_window(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, window_secs: i64) -> Self {
        Self {
            store,
            clock,
            window: Duration::seconds(window_secs.max(1)),
        }
    }

    /// Returns true if `direction` repeats the last marker within the window.
    ///
    /// A suppressed call leaves the marker untouched; any other call
    /// overwrites it with `(direction, now)`. A marker from the future (clock
    /// moved backwards) never suppresses.
    pub fn should_debounce(&self, direction: Direction) -> bool {
        let now = self.clock.now();

        if let Some(last) = self.last_marker() {
            let elapsed = now - last.at;
            if last.direction == direction && elapsed >= Duration::zero() && elapsed < self.window {
                debug!(%direction, elapsed_ms = elapsed.num_milliseconds(), "debounced transition");
                return true;
            }
        }

        write_json(
            self.store.as_ref(),
            keys::LAST_TRANSITION,
            &LastTransitionMarker { direction, at: now },
        );
        false
    }

    /// Reads the stored marker.
    pub fn last_marker(&self) -> Option<LastTransitionMarker> {
        read_json(self.store.as_ref(), keys::LAST_TRANSITION)
    }
}
