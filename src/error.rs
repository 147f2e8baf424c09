//! Error types for geoproof.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Only `arm()` and configuration loading surface errors
//! to callers. Storage and delivery failures keep their own types
//! (`StorageError`, `LedgerError`) and never leave the engine: the background
//! transition handler turns them into a no-op, an enqueue, or a log line.

use thiserror::Error;

/// Validation errors raised before any platform or storage side effect.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Event id cannot be empty")]
    EmptyEventId,

    #[error("Coordinate ({lat}, {lng}) is out of range")]
    InvalidCoordinate {
        lat: f64,
        lng: f64,
    },

    #[error("Radius {radius} must be a positive, finite number of meters")]
    InvalidRadius {
        radius: f64,
    },

    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp {
        value: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Location permission missing at arm time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Foreground location permission not granted")]
    ForegroundDenied,

    #[error("Background location permission not granted")]
    BackgroundDenied,
}

/// The host platform refused a region registration request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Region registration failed: {message}")]
    Registration {
        message: String,
    },

    #[error("Region unregistration failed: {message}")]
    Unregistration {
        message: String,
    },

    #[error("Platform query failed: {message}")]
    Query {
        message: String,
    },
}

/// Top-level error type for geoproof.
#[derive(Debug, Error)]
pub enum GeoproofError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl GeoproofError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a permission error.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }

    /// Returns true if this is a platform error.
    #[must_use]
    pub const fn is_platform(&self) -> bool {
        matches!(self, Self::Platform(_))
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Permission errors are never retried silently.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Permission(_) => false,
            Self::Platform(_) => true,
        }
    }
}

/// Result type alias for geoproof operations.
pub type GeoproofResult<T> = Result<T, GeoproofError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_radius() {
        let err = ValidationError::InvalidRadius { radius: -5.0 };
        let msg = format!("{err}");
        assert!(msg.contains("-5"));
        assert!(msg.contains("meters"));
    }

    #[test]
    fn test_permission_error_not_retryable() {
        let err: GeoproofError = PermissionError::BackgroundDenied.into();
        assert!(err.is_permission());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Background"));
    }

    #[test]
    fn test_platform_error_retryable() {
        let err: GeoproofError = PlatformError::Registration {
            message: "region limit reached".to_string(),
        }
        .into();
        assert!(err.is_platform());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("region limit reached"));
    }

    #[test]
    fn test_validation_not_retryable() {
        let err: GeoproofError = ValidationError::EmptyEventId.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }
}
