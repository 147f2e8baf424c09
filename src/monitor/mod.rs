//! Geofence monitoring: the host platform seams and the engine that reacts
//! to boundary crossings.
//!
//! The host (a mobile OS region tracker, or a test double) implements
//! [`LocationPlatform`] and optionally [`Notifier`]. The embedding app builds
//! a [`GeofenceMonitor`] at process start and registers it in a
//! [`TaskRegistry`] so signals delivered after a cold start find a handler.

/// Arming, disarming, and the transition handler.
pub mod geofence;
/// Region tracker and notification traits.
pub mod platform;
/// Name-addressed handler table.
pub mod registry;
/// Raw host signals.
pub mod signal;

pub use geofence::{ArmRequest, GeofenceMonitor, GeofenceMonitorBuilder, MonitorStatus, TransitionOutcome};
pub use platform::{LocationPlatform, Notifier, NotifyError, PermissionStatus};
pub use registry::{TaskRegistry, TransitionHandler};
pub use signal::{RawSignal, SignalKind};
