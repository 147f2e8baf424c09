//! The geofence monitor: arming, disarming, and the background transition
//! handler.
//!
//! The handler may run in a freshly started process with no UI state, so
//! every piece of state it needs (active event, debounce marker, offline
//! queue, device id) is read from the shared [`KeyValueStore`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::GeoproofConfig;
use crate::context::{ActiveEventContext, ActiveEventMeta, ExpiryHook};
use crate::debounce::Debouncer;
use crate::device::resolve_device_label;
use crate::error::{GeoproofResult, PermissionError, ValidationError};
use crate::queue::{Deliver, FlushReport, SyncQueue, TransitionRecord};
use crate::region::{event_id_from_region, Coordinate, Direction, GeofenceRegion};
use crate::storage::KeyValueStore;
use crate::sync::{RemoteLedger, ServerSync};
use crate::time::{Clock, SystemClock};

use super::platform::{LocationPlatform, Notifier};
use super::registry::{TaskRegistry, TransitionHandler};
use super::signal::RawSignal;

/// Parameters for [`GeofenceMonitor::arm`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArmRequest {
    /// Event the attendance window belongs to.
    pub event_id: String,
    /// Region center latitude.
    pub lat: f64,
    /// Region center longitude.
    pub lng: f64,
    /// Region radius.
    pub radius_meters: f64,
    /// When the attendance window ends; `None` keeps it open until disarm.
    pub end_utc: Option<DateTime<Utc>>,
    /// Whether the host should report entries.
    pub notify_on_enter: bool,
    /// Whether the host should report exits.
    pub notify_on_exit: bool,
}

impl ArmRequest {
    /// A request reporting both directions with no end time.
    #[must_use]
    pub fn new(event_id: impl Into<String>, lat: f64, lng: f64, radius_meters: f64) -> Self {
        Self {
            event_id: event_id.into(),
            lat,
            lng,
            radius_meters,
            end_utc: None,
            notify_on_enter: true,
            notify_on_exit: true,
        }
    }

    /// Sets the window end.
    #[must_use]
    pub fn ends_at(mut self, end_utc: DateTime<Utc>) -> Self {
        self.end_utc = Some(end_utc);
        self
    }

    /// Selects which directions the host reports.
    #[must_use]
    pub fn reporting(mut self, on_enter: bool, on_exit: bool) -> Self {
        self.notify_on_enter = on_enter;
        self.notify_on_exit = on_exit;
        self
    }

    fn region(&self) -> Result<GeofenceRegion, ValidationError> {
        let center = Coordinate::new(self.lat, self.lng)?;
        let mut region = GeofenceRegion::for_event(&self.event_id, center, self.radius_meters)?;
        region.notify_on_enter = self.notify_on_enter;
        region.notify_on_exit = self.notify_on_exit;
        Ok(region)
    }
}

/// Result of [`GeofenceMonitor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStatus {
    /// Whether the host reports regions registered under the task.
    pub started: bool,
}

/// What the handler did with one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The platform reported an error; nothing was recorded.
    PlatformError {
        /// Platform-provided message.
        message: String,
    },
    /// Same direction inside the debounce window.
    Debounced,
    /// No event could be attributed; nothing was recorded.
    NoActiveEvent,
    /// The ledger accepted the record immediately.
    Delivered {
        /// Idempotency key of the record.
        idem: String,
    },
    /// Delivery failed; the record was queued and a flush attempted.
    Queued {
        /// Idempotency key of the record.
        idem: String,
        /// Result of the flush attempted right after queueing.
        flush: FlushReport,
    },
}

/// Unregisters the platform region when the active event window ends.
struct StopOnExpiry {
    platform: Arc<dyn LocationPlatform>,
    task_name: String,
}

#[async_trait]
impl ExpiryHook for StopOnExpiry {
    async fn on_expired(&self, event_id: &str) {
        if let Err(e) = self.platform.stop_region_monitoring(&self.task_name).await {
            warn!(event_id, error = %e, "failed to stop monitoring for expired event");
        }
    }
}

/// Builder for [`GeofenceMonitor`].
pub struct GeofenceMonitorBuilder {
    store: Arc<dyn KeyValueStore>,
    platform: Arc<dyn LocationPlatform>,
    ledger: Arc<dyn RemoteLedger>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn Notifier>>,
    config: GeoproofConfig,
}

impl GeofenceMonitorBuilder {
    /// Overrides the clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs a local notification surface.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Overrides the engine configuration.
    #[must_use]
    pub fn config(mut self, config: GeoproofConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and assembles the monitor.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an unusable configuration.
    pub fn build(self) -> Result<GeofenceMonitor, ValidationError> {
        let config = self.config.validate()?;

        let hook = Arc::new(StopOnExpiry {
            platform: Arc::clone(&self.platform),
            task_name: config.task_name.clone(),
        });
        let context =
            ActiveEventContext::new(Arc::clone(&self.store), Arc::clone(&self.clock)).with_expiry_hook(hook);
        let debouncer = Debouncer::with_window(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            config.debounce_window_secs,
        );
        let queue = SyncQueue::new(Arc::clone(&self.store));
        let sync = ServerSync::new(self.ledger, Duration::from_millis(config.delivery_timeout_ms));
        let device = resolve_device_label(self.store.as_ref(), config.device_label.as_deref());

        Ok(GeofenceMonitor {
            config,
            platform: self.platform,
            clock: self.clock,
            notifier: self.notifier,
            context,
            debouncer,
            queue,
            sync,
            device,
        })
    }
}

/// Attendance verification engine bound to one host platform and ledger.
pub struct GeofenceMonitor {
    config: GeoproofConfig,
    platform: Arc<dyn LocationPlatform>,
    clock: Arc<dyn Clock>,
    notifier: Option<Arc<dyn Notifier>>,
    context: ActiveEventContext,
    debouncer: Debouncer,
    queue: SyncQueue,
    sync: ServerSync,
    device: String,
}

impl GeofenceMonitor {
    /// Starts a builder with the system clock, no notifier, and default
    /// configuration.
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        platform: Arc<dyn LocationPlatform>,
        ledger: Arc<dyn RemoteLedger>,
    ) -> GeofenceMonitorBuilder {
        GeofenceMonitorBuilder {
            store,
            platform,
            ledger,
            clock: Arc::new(SystemClock),
            notifier: None,
            config: GeoproofConfig::default(),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &GeoproofConfig {
        &self.config
    }

    /// Device label written into records.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Registers this monitor in `registry` under the configured task name.
    pub fn register_task(self: &Arc<Self>, registry: &TaskRegistry) {
        registry.register(self.config.task_name.clone(), Arc::clone(self) as Arc<dyn TransitionHandler>);
    }

    /// Arms monitoring for one event.
    ///
    /// Order: validate, check permissions, drop any previous region,
    /// register the new one, persist the active event, then flush whatever
    /// was queued offline. A failure before registration leaves no state
    /// behind.
    ///
    /// # Errors
    ///
    /// - `GeoproofError::Validation` for a blank id, bad coordinate, or radius
    /// - `GeoproofError::Permission` when a required permission is missing
    /// - `GeoproofError::Platform` when the host refuses the registration
    pub async fn arm(&self, request: ArmRequest) -> GeoproofResult<()> {
        let region = request.region()?;
        self.check_permissions().await?;

        let task = self.config.task_name.as_str();
        match self.platform.is_region_monitoring(task).await {
            Ok(false) => {}
            Ok(true) | Err(_) => {
                if let Err(e) = self.platform.stop_region_monitoring(task).await {
                    debug!(task, error = %e, "no previous region to stop");
                }
            }
        }

        self.platform.start_region_monitoring(task, std::slice::from_ref(&region)).await?;

        let event_id = request.event_id.trim();
        self.context.set_active_event(event_id, request.end_utc);
        info!(
            event_id,
            region = %region.identifier,
            radius_meters = region.radius_meters,
            "geofence armed"
        );

        let report = self.queue.flush_once(&self.sync).await;
        if report.delivered > 0 || report.remaining > 0 {
            info!(delivered = report.delivered, remaining = report.remaining, "flushed queue on arm");
        }
        Ok(())
    }

    async fn check_permissions(&self) -> Result<(), PermissionError> {
        if !self.platform.foreground_permission().await.is_granted() {
            return Err(PermissionError::ForegroundDenied);
        }
        match self.platform.background_permission().await {
            Some(status) if !status.is_granted() => Err(PermissionError::BackgroundDenied),
            _ => Ok(()),
        }
    }

    /// Stops monitoring and clears the active event. Never fails; the
    /// context is cleared even if the platform call errors.
    pub async fn disarm(&self) {
        if let Err(e) = self.platform.stop_region_monitoring(&self.config.task_name).await {
            debug!(error = %e, "stop monitoring failed during disarm");
        }
        self.context.clear_active_event();
        info!("geofence disarmed");
    }

    /// Whether the host reports regions registered under the task. Query
    /// failures read as not started.
    pub async fn status(&self) -> MonitorStatus {
        let started = match self.platform.is_region_monitoring(&self.config.task_name).await {
            Ok(started) => started,
            Err(e) => {
                warn!(error = %e, "monitoring status query failed");
                false
            }
        };
        MonitorStatus { started }
    }

    /// Stored active event, without enforcing expiry.
    #[must_use]
    pub fn active_event(&self) -> Option<ActiveEventMeta> {
        self.context.current()
    }

    /// Resolves the active event id, clearing it (and stopping monitoring)
    /// if its window has ended.
    pub async fn active_event_id(&self) -> Option<String> {
        self.context.get_active_event_id().await
    }

    /// Attempts delivery of every queued record, stopping at the first failure.
    pub async fn flush_pending(&self) -> FlushReport {
        self.queue.flush_once(&self.sync).await
    }

    /// Number of records awaiting delivery.
    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    /// Processes one signal from the host. Never fails.
    pub async fn on_transition(&self, signal: RawSignal) -> TransitionOutcome {
        if let Some(message) = signal.error {
            warn!(%message, "platform reported a geofencing error");
            self.notify("Geofence error", &message).await;
            return TransitionOutcome::PlatformError { message };
        }

        let direction = signal.kind.direction();
        if self.debouncer.should_debounce(direction) {
            return TransitionOutcome::Debounced;
        }

        let event_id = match self.context.get_active_event_id().await {
            Some(id) => id,
            None => match self.event_from_live_region(signal.region_identifier.as_deref()).await {
                Some(id) => {
                    debug!(event_id = %id, "no active context; using event id from region name");
                    id
                }
                None => {
                    info!(%direction, "transition without an active event ignored");
                    return TransitionOutcome::NoActiveEvent;
                }
            },
        };

        let record = match TransitionRecord::new(
            &event_id,
            direction,
            self.clock.now(),
            signal.region_identifier,
            signal.accuracy_meters,
            self.device.clone(),
            self.config.debounce_window_secs,
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "transition record rejected");
                return TransitionOutcome::NoActiveEvent;
            }
        };
        let idem = record.idem.clone();

        let outcome = if self.sync.deliver(&record).await {
            TransitionOutcome::Delivered { idem }
        } else {
            self.queue.enqueue(record).await;
            let flush = self.queue.flush_once(&self.sync).await;
            TransitionOutcome::Queued { idem, flush }
        };

        let (title, body) = notification_text(direction, &event_id, &outcome);
        self.notify(title, &body).await;
        outcome
    }

    /// Event id embedded in the region name, trusted only while the host
    /// still has the task's region registered. Disarm and expiry both
    /// unregister, so late callbacks from a stopped region resolve to nothing.
    async fn event_from_live_region(&self, region_identifier: Option<&str>) -> Option<String> {
        let event_id = region_identifier.and_then(event_id_from_region)?;
        match self.platform.is_region_monitoring(&self.config.task_name).await {
            Ok(true) => Some(event_id),
            Ok(false) => {
                debug!(event_id = %event_id, "region no longer monitored; ignoring its name");
                None
            }
            Err(e) => {
                warn!(error = %e, "monitoring status query failed; ignoring region name");
                None
            }
        }
    }

    async fn notify(&self, title: &str, body: &str) {
        if !self.config.notifications_enabled {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !notifier.is_available() {
            return;
        }
        if let Err(e) = notifier.notify(title, body).await {
            debug!(error = %e, "notification not shown");
        }
    }
}

fn notification_text(direction: Direction, event_id: &str, outcome: &TransitionOutcome) -> (&'static str, String) {
    let title = match direction {
        Direction::Enter => "Checked in",
        Direction::Exit => "Checked out",
    };
    let body = match outcome {
        TransitionOutcome::Queued { .. } => format!("Event {event_id}: saved offline, will sync when online"),
        _ => format!("Event {event_id}: attendance recorded"),
    };
    (title, body)
}

#[async_trait]
impl TransitionHandler for GeofenceMonitor {
    async fn handle(&self, signal: RawSignal) -> TransitionOutcome {
        self.on_transition(signal).await
    }
}
