//! Test doubles for the host platform, the ledger, and notifications.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use geoproof::monitor::NotifyError;
use geoproof::{
    GeofenceMonitor, GeofenceRegion, GeoproofConfig, InMemoryKeyValueStore, KeyValueStore, LedgerError,
    LocationPlatform, ManualClock, Notifier, PermissionStatus, PlatformError, RemoteLedger, StorageError,
    TransitionRecord,
};

/// Region tracker that keeps registrations in memory.
pub struct FakePlatform {
    pub foreground: Mutex<PermissionStatus>,
    pub background: Mutex<Option<PermissionStatus>>,
    pub regions: Mutex<HashMap<String, Vec<GeofenceRegion>>>,
    pub fail_start: AtomicBool,
    pub stop_calls: AtomicUsize,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            foreground: Mutex::new(PermissionStatus::Granted),
            background: Mutex::new(Some(PermissionStatus::Granted)),
            regions: Mutex::new(HashMap::new()),
            fail_start: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
        }
    }
}

impl FakePlatform {
    pub fn registered(&self, task: &str) -> Vec<GeofenceRegion> {
        self.regions.lock().unwrap().get(task).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LocationPlatform for FakePlatform {
    async fn foreground_permission(&self) -> PermissionStatus {
        *self.foreground.lock().unwrap()
    }

    async fn background_permission(&self) -> Option<PermissionStatus> {
        *self.background.lock().unwrap()
    }

    async fn start_region_monitoring(&self, task_name: &str, regions: &[GeofenceRegion]) -> Result<(), PlatformError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PlatformError::Registration {
                message: "location services disabled".to_string(),
            });
        }
        self.regions.lock().unwrap().insert(task_name.to_string(), regions.to_vec());
        Ok(())
    }

    async fn stop_region_monitoring(&self, task_name: &str) -> Result<(), PlatformError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        match self.regions.lock().unwrap().remove(task_name) {
            Some(_) => Ok(()),
            None => Err(PlatformError::Unregistration {
                message: format!("task {task_name} not started"),
            }),
        }
    }

    async fn is_region_monitoring(&self, task_name: &str) -> Result<bool, PlatformError> {
        Ok(self.regions.lock().unwrap().contains_key(task_name))
    }
}

/// Ledger holding rows in memory, unique on `idem`.
pub struct FakeLedger {
    pub online: AtomicBool,
    pub procedure_deployed: AtomicBool,
    pub rows: Mutex<Vec<TransitionRecord>>,
    pub procedure_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            procedure_deployed: AtomicBool::new(true),
            rows: Mutex::new(Vec::new()),
            procedure_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeLedger {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<TransitionRecord> {
        self.rows.lock().unwrap().clone()
    }

    fn store_row(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(LedgerError::Network {
                message: "offline".to_string(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.idem == record.idem) {
            return Err(LedgerError::Duplicate {
                idem: record.idem.clone(),
            });
        }
        rows.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl RemoteLedger for FakeLedger {
    async fn record_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        self.procedure_calls.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) && !self.procedure_deployed.load(Ordering::SeqCst) {
            return Err(LedgerError::ProcedureUnavailable {
                message: "PGRST202".to_string(),
            });
        }
        self.store_row(record)
    }

    async fn insert_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.store_row(record)
    }
}

/// Notifier that records what it was asked to show.
pub struct RecordingNotifier {
    pub available: AtomicBool,
    pub shown: Mutex<Vec<(String, String)>>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            shown: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.shown.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        self.shown.lock().unwrap().push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Store whose every read and write fails, like a full or revoked disk.
#[derive(Default)]
pub struct FailingStore {
    pub attempts: AtomicUsize,
}

impl FailingStore {
    fn fail(&self) -> StorageError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        StorageError::BackendError("disk unavailable".to_string())
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(self.fail())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(self.fail())
    }

    fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(self.fail())
    }
}

/// Shared state that outlives any one monitor, like a device across process
/// restarts.
pub struct Harness {
    pub store: Arc<InMemoryKeyValueStore>,
    pub clock: ManualClock,
    pub platform: Arc<FakePlatform>,
    pub ledger: Arc<FakeLedger>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryKeyValueStore::new()),
            clock: ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            platform: Arc::new(FakePlatform::default()),
            ledger: Arc::new(FakeLedger::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    /// Builds a fresh monitor over the shared state, as a newly launched
    /// process would.
    pub fn monitor(&self) -> GeofenceMonitor {
        self.monitor_with(GeoproofConfig {
            device_label: Some("test-device".to_string()),
            ..GeoproofConfig::default()
        })
    }

    pub fn monitor_with(&self, config: GeoproofConfig) -> GeofenceMonitor {
        GeofenceMonitor::builder(self.store.clone(), self.platform.clone(), self.ledger.clone())
            .clock(Arc::new(self.clock.clone()))
            .notifier(self.notifier.clone())
            .config(config)
            .build()
            .unwrap()
    }
}
