//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Width of the debounce window, also the idempotency time-slot width.
pub const DEBOUNCE_WINDOW_SECS: i64 = 30;

/// Stable name under which the transition handler is registered with the host.
pub const DEFAULT_TASK_NAME: &str = "GEOPROOF_GEOFENCE_TASK";

/// Configuration for the attendance engine.
///
/// # Examples
///
/// ```
/// use geoproof::GeoproofConfig;
///
/// let cfg = GeoproofConfig::from_json(r#"{ "deliveryTimeoutMs": 2500 }"#).unwrap();
/// assert_eq!(cfg.delivery_timeout_ms, 2500);
/// assert_eq!(cfg.debounce_window_secs, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoproofConfig {
    /// Same-direction signals closer than this are suppressed.
    pub debounce_window_secs: i64,
    /// Upper bound for a single remote delivery call.
    pub delivery_timeout_ms: u64,
    /// Task name the host platform resolves after a cold start.
    pub task_name: String,
    /// Device label written into every record; a persisted UUID when unset.
    pub device_label: Option<String>,
    /// Whether transitions produce a local notification.
    pub notifications_enabled: bool,
}

impl Default for GeoproofConfig {
    fn default() -> Self {
        Self {
            debounce_window_secs: DEBOUNCE_WINDOW_SECS,
            delivery_timeout_ms: 10_000,
            task_name: DEFAULT_TASK_NAME.to_string(),
            device_label: None,
            notifications_enabled: true,
        }
    }
}

impl GeoproofConfig {
    /// Rejects configurations the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the offending field.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.debounce_window_secs < 1 {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "debounceWindowSecs must be at least 1 (got {})",
                    self.debounce_window_secs
                ),
            });
        }

        if self.delivery_timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "deliveryTimeoutMs must be non-zero".to_string(),
            });
        }

        if self.task_name.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "taskName cannot be empty".to_string(),
            });
        }

        Ok(self)
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` on malformed JSON or invalid values.
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(raw).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        cfg.validate()
    }
}
