//! Geofence regions and transition directions.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Prefix of region identifiers produced by [`region_identifier_for`].
pub const REGION_ID_PREFIX: &str = "event:";

/// Direction of a geofence boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// The device moved inside the region.
    Enter,
    /// The device moved outside the region.
    Exit,
}

impl Direction {
    /// Wire representation (`ENTER` / `EXIT`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WGS-84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinate {
    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidCoordinate` for non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if !valid {
            return Err(ValidationError::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }
}

/// A circular region handed to the host platform's region tracker.
///
/// Once registered the host owns it; at most one region is registered at a
/// time.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRegion {
    pub identifier: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_meters: f64,
    pub notify_on_enter: bool,
    pub notify_on_exit: bool,
}

impl GeofenceRegion {
    /// Builds the region for an event, named so the event id can be recovered
    /// from the identifier alone.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a blank event id or a non-positive radius.
    pub fn for_event(
        event_id: &str,
        center: Coordinate,
        radius_meters: f64,
    ) -> Result<Self, ValidationError> {
        if !(radius_meters.is_finite() && radius_meters > 0.0) {
            return Err(ValidationError::InvalidRadius {
                radius: radius_meters,
            });
        }
        Ok(Self {
            identifier: region_identifier_for(event_id)?,
            center_lat: center.lat,
            center_lng: center.lng,
            radius_meters,
            notify_on_enter: true,
            notify_on_exit: true,
        })
    }

    /// Returns the region center.
    #[must_use]
    pub const fn center(&self) -> Coordinate {
        Coordinate {
            lat: self.center_lat,
            lng: self.center_lng,
        }
    }
}

/// Names the region armed for `event_id`.
///
/// # Errors
///
/// Returns `ValidationError::EmptyEventId` if the id is blank.
pub fn region_identifier_for(event_id: &str) -> Result<String, ValidationError> {
    let trimmed = event_id.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyEventId);
    }
    Ok(format!("{REGION_ID_PREFIX}{trimmed}"))
}

fn region_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Older builds used `event-<id>` and `event_<id>`.
        Regex::new(r"^event[:_-](?P<id>.+)$").unwrap_or_else(|e| panic!("static regex: {e}"))
    })
}

/// Recovers the event id embedded in a region identifier, if any.
///
/// # Examples
///
/// ```
/// use geoproof::region::event_id_from_region;
///
/// assert_eq!(event_id_from_region("event:E1").as_deref(), Some("E1"));
/// assert_eq!(event_id_from_region("venue-42"), None);
/// ```
#[must_use]
pub fn event_id_from_region(identifier: &str) -> Option<String> {
    let caps = region_id_pattern().captures(identifier.trim())?;
    let id = caps.name("id")?.as_str().trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
