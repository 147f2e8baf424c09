//! Idempotency keys for transition records.
//!
//! A key is the BLAKE3 digest of `eventId|regionId|direction|slot`, where
//! `slot = floor(unix_seconds / window)`. Retries of one logical transition
//! inside one slot collapse to one key. A transition whose retries straddle a
//! slot boundary yields two keys; the server then records two transitions.

use chrono::{DateTime, Utc};

use crate::config::DEBOUNCE_WINDOW_SECS;
use crate::error::ValidationError;
use crate::region::Direction;
use crate::time::parse_iso;

/// Placeholder hashed in place of a missing region id.
const NO_REGION: &str = "null";

/// Time slot containing `at` for a window of `window_secs` seconds.
///
/// Uses floor division so instants before the epoch land in negative slots.
#[must_use]
pub fn time_slot(at: DateTime<Utc>, window_secs: i64) -> i64 {
    at.timestamp().div_euclid(window_secs.max(1))
}

/// Derives the idempotency key with an explicit window.
#[must_use]
pub fn derive_with_window(
    event_id: &str,
    region_id: Option<&str>,
    direction: Direction,
    at: DateTime<Utc>,
    window_secs: i64,
) -> String {
    let slot = time_slot(at, window_secs);
    let material = format!(
        "{event_id}|{}|{}|{slot}",
        region_id.unwrap_or(NO_REGION),
        direction.as_str()
    );
    blake3::hash(material.as_bytes()).to_hex().to_string()
}

/// Derives the idempotency key using the standard 30 second window.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use geoproof::idempotency::derive;
/// use geoproof::Direction;
///
/// let t1 = Utc.timestamp_opt(60, 0).unwrap();
/// let t2 = Utc.timestamp_opt(89, 0).unwrap();
/// assert_eq!(
///     derive("E1", Some("event:E1"), Direction::Enter, t1),
///     derive("E1", Some("event:E1"), Direction::Enter, t2),
/// );
/// ```
#[must_use]
pub fn derive(
    event_id: &str,
    region_id: Option<&str>,
    direction: Direction,
    at: DateTime<Utc>,
) -> String {
    derive_with_window(event_id, region_id, direction, at, DEBOUNCE_WINDOW_SECS)
}

/// Derives the key from an ISO-8601 timestamp string.
///
/// # Errors
///
/// Returns `ValidationError::InvalidTimestamp` if `at_iso` does not parse.
pub fn derive_from_iso(
    event_id: &str,
    region_id: Option<&str>,
    direction: Direction,
    at_iso: &str,
) -> Result<String, ValidationError> {
    Ok(derive(event_id, region_id, direction, parse_iso(at_iso)?))
}
