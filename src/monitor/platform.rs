//! Host platform seams: region tracking, permissions, local notifications.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::PlatformError;
use crate::region::GeofenceRegion;

/// State of one location permission tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Access granted.
    Granted,
    /// Access refused.
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

impl PermissionStatus {
    /// True only for `Granted`.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// The host's region tracker.
///
/// Regions are grouped under a task name; the host invokes the handler
/// registered under that name whenever a boundary is crossed, possibly after
/// relaunching the process.
#[async_trait]
pub trait LocationPlatform: Send + Sync {
    /// Foreground ("while in use") location permission.
    async fn foreground_permission(&self) -> PermissionStatus;

    /// Background ("always") permission, or `None` on platforms without a
    /// separate background tier.
    async fn background_permission(&self) -> Option<PermissionStatus>;

    /// Starts tracking `regions` under `task_name`.
    async fn start_region_monitoring(
        &self,
        task_name: &str,
        regions: &[GeofenceRegion],
    ) -> Result<(), PlatformError>;

    /// Stops tracking every region under `task_name`.
    async fn stop_region_monitoring(&self, task_name: &str) -> Result<(), PlatformError>;

    /// Whether regions are currently tracked under `task_name`.
    async fn is_region_monitoring(&self, task_name: &str) -> Result<bool, PlatformError>;
}

/// A local notification could not be shown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Local notification surface. Availability varies by platform and must be
/// probed before use.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether notifications can be shown right now.
    fn is_available(&self) -> bool;

    /// Shows a notification.
    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}
