//! Delivery of transition records to the remote attendance ledger.
//!
//! Strategy per record:
//! 1. Call the ledger's recording procedure with the full record.
//! 2. If the procedure does not exist on the server, insert the same fields
//!    into the raw append-only table; a uniqueness constraint on `idem`
//!    keeps retries from producing a second logical effect.
//! 3. Anything else (timeout, auth, malformed response) is a failed
//!    delivery. The caller queues and retries.

#[cfg(feature = "http")]
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::queue::{Deliver, TransitionRecord};

/// Failure reported by a ledger call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The recording procedure is not deployed on the server.
    #[error("Ledger procedure unavailable: {message}")]
    ProcedureUnavailable {
        /// Server-provided detail.
        message: String,
    },

    /// The ledger already holds a record with this idempotency key.
    #[error("Transition already recorded (idem {idem})")]
    Duplicate {
        /// The conflicting key.
        idem: String,
    },

    /// Credentials missing, expired, or insufficient.
    #[error("Ledger rejected credentials: {message}")]
    Unauthorized {
        /// Server-provided detail.
        message: String,
    },

    /// The call did not finish in time.
    #[error("Ledger call timed out after {after_ms}ms")]
    Timeout {
        /// Configured bound.
        after_ms: u64,
    },

    /// The request never reached the server or the connection dropped.
    #[error("Network error: {message}")]
    Network {
        /// Transport detail.
        message: String,
    },

    /// The server answered with an error status.
    #[error("Ledger rejected request (status {status}): {message}")]
    Rejected {
        /// Status code.
        status: u16,
        /// Server-provided detail.
        message: String,
    },

    /// The server answered with something that could not be interpreted.
    #[error("Malformed ledger response: {message}")]
    MalformedResponse {
        /// Decoder detail.
        message: String,
    },
}

impl LedgerError {
    /// True for failures a later retry may clear without intervention.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::ProcedureUnavailable { .. }
            | Self::Duplicate { .. }
            | Self::Unauthorized { .. }
            | Self::MalformedResponse { .. } => false,
        }
    }
}

/// The two remote shapes the ledger exposes.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Procedure-style call carrying the full record.
    async fn record_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError>;

    /// Raw insert into the append-only table, deduplicated server-side on `idem`.
    async fn insert_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError>;
}

/// How a successful delivery landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Accepted by the recording procedure.
    Procedure,
    /// Accepted by the raw insert fallback.
    Fallback,
    /// The ledger already held this `idem`.
    AlreadyRecorded,
}

/// Delivery strategy over a [`RemoteLedger`].
#[derive(Clone)]
pub struct ServerSync {
    ledger: Arc<dyn RemoteLedger>,
    timeout: Duration,
}

impl ServerSync {
    /// Creates a strategy bounding each remote call by `timeout`.
    pub fn new(ledger: Arc<dyn RemoteLedger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Delivers one record, reporting which path accepted it.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempted call.
    pub async fn deliver_detailed(&self, record: &TransitionRecord) -> Result<DeliveryPath, LedgerError> {
        match self.bounded(self.ledger.record_transition(record)).await {
            Ok(()) => Ok(DeliveryPath::Procedure),
            Err(LedgerError::Duplicate { .. }) => Ok(DeliveryPath::AlreadyRecorded),
            Err(LedgerError::ProcedureUnavailable { message }) => {
                debug!(idem = %record.idem, %message, "procedure unavailable; using raw insert");
                match self.bounded(self.ledger.insert_transition(record)).await {
                    Ok(()) => Ok(DeliveryPath::Fallback),
                    Err(LedgerError::Duplicate { .. }) => Ok(DeliveryPath::AlreadyRecorded),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<(), LedgerError>
    where
        F: std::future::Future<Output = Result<(), LedgerError>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl Deliver for ServerSync {
    async fn deliver(&self, record: &TransitionRecord) -> bool {
        match self.deliver_detailed(record).await {
            Ok(path) => {
                debug!(idem = %record.idem, ?path, "transition delivered");
                true
            }
            Err(e) => {
                warn!(idem = %record.idem, event_id = %record.event_id, error = %e, "transition delivery failed");
                false
            }
        }
    }
}
