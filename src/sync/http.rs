//! REST ledger client.
//!
//! Talks to a PostgREST-style backend:
//! - procedure: `POST {base}/rest/v1/rpc/{procedure}` with the record as JSON
//! - fallback:  `POST {base}/rest/v1/{table}` with `Prefer: return=minimal`

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ValidationError;
use crate::queue::TransitionRecord;

use super::{LedgerError, RemoteLedger};

/// Connection settings for [`HttpLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Project base URL, without a trailing slash.
    pub base_url: String,
    /// Public API key sent as `apikey`.
    pub api_key: String,
    /// User session token; the API key is used as bearer when absent.
    pub bearer_token: Option<String>,
    /// Name of the recording procedure.
    pub procedure: String,
    /// Name of the raw append-only table.
    pub table: String,
}

impl LedgerConfig {
    /// Default procedure name.
    pub const DEFAULT_PROCEDURE: &'static str = "record_geofence_transition";
    /// Default raw table name.
    pub const DEFAULT_TABLE: &'static str = "geofence_transitions";

    /// Creates a config with default procedure and table names.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bearer_token: None,
            procedure: Self::DEFAULT_PROCEDURE.to_string(),
            table: Self::DEFAULT_TABLE.to_string(),
        }
    }

    /// Reads `GEOPROOF_LEDGER_URL`, `GEOPROOF_LEDGER_KEY`, and the optional
    /// `GEOPROOF_LEDGER_TOKEN`, `GEOPROOF_LEDGER_PROCEDURE`, `GEOPROOF_LEDGER_TABLE`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if a required variable is unset.
    pub fn from_env() -> Result<Self, ValidationError> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ValidationError::InvalidConfig {
                    reason: format!("{name} is not set"),
                })
        };
        let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut cfg = Self::new(required("GEOPROOF_LEDGER_URL")?, required("GEOPROOF_LEDGER_KEY")?);
        cfg.bearer_token = optional("GEOPROOF_LEDGER_TOKEN");
        if let Some(procedure) = optional("GEOPROOF_LEDGER_PROCEDURE") {
            cfg.procedure = procedure;
        }
        if let Some(table) = optional("GEOPROOF_LEDGER_TABLE") {
            cfg.table = table;
        }
        Ok(cfg)
    }

    fn procedure_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, self.procedure)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-success response to a [`LedgerError`].
fn classify(status: u16, body: &str, idem: &str) -> LedgerError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| body.trim().chars().take(200).collect());

    // PGRST202: function not in schema cache; 42883: undefined function.
    if status == 404 || code == "PGRST202" || code == "42883" {
        return LedgerError::ProcedureUnavailable { message };
    }
    // 23505: unique_violation. Other 409s (e.g. 23503 foreign_key_violation)
    // are real rejections and must stay queued.
    if code == "23505" || (status == 409 && code.is_empty()) {
        return LedgerError::Duplicate {
            idem: idem.to_string(),
        };
    }
    if status == 401 || status == 403 {
        return LedgerError::Unauthorized { message };
    }
    LedgerError::Rejected { status, message }
}

fn transport_error(e: &reqwest::Error) -> LedgerError {
    if e.is_decode() {
        LedgerError::MalformedResponse {
            message: e.to_string(),
        }
    } else {
        LedgerError::Network {
            message: e.to_string(),
        }
    }
}

/// [`RemoteLedger`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedger {
    /// Creates a client with a default `reqwest::Client`.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: LedgerConfig) -> Self {
        Self { client, config }
    }

    async fn post(&self, url: String, record: &TransitionRecord, minimal: bool) -> Result<(), LedgerError> {
        let bearer = self.config.bearer_token.as_deref().unwrap_or(&self.config.api_key);
        let mut request = self
            .client
            .post(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
            .json(record);
        if minimal {
            request = request.header("Prefer", "return=minimal");
        }

        let resp = request.send().await.map_err(|e| transport_error(&e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.map_err(|e| transport_error(&e))?;
        Err(classify(status.as_u16(), &body, &record.idem))
    }
}

#[async_trait]
impl RemoteLedger for HttpLedger {
    async fn record_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        self.post(self.config.procedure_url(), record, false).await
    }

    async fn insert_transition(&self, record: &TransitionRecord) -> Result<(), LedgerError> {
        self.post(self.config.table_url(), record, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let cfg = LedgerConfig::new("https://db.example.com/", "anon");
        assert_eq!(cfg.procedure_url(), "https://db.example.com/rest/v1/rpc/record_geofence_transition");
        assert_eq!(cfg.table_url(), "https://db.example.com/rest/v1/geofence_transitions");
    }

    #[test]
    fn test_classify_missing_procedure() {
        let body = r#"{"code":"PGRST202","message":"Could not find the function"}"#;
        assert!(matches!(classify(404, body, "k"), LedgerError::ProcedureUnavailable { .. }));
        assert!(matches!(
            classify(400, r#"{"code":"42883","message":"function does not exist"}"#, "k"),
            LedgerError::ProcedureUnavailable { .. }
        ));
    }

    #[test]
    fn test_classify_unique_violation() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert_eq!(classify(409, body, "k"), LedgerError::Duplicate { idem: "k".to_string() });
    }

    #[test]
    fn test_classify_conflict_other_than_unique_is_rejected() {
        let body = r#"{"code":"23503","message":"insert or update violates foreign key constraint"}"#;
        match classify(409, body, "k") {
            LedgerError::Rejected { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("foreign key"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(classify(409, "", "k"), LedgerError::Duplicate { idem: "k".to_string() });
    }

    #[test]
    fn test_classify_auth_and_other() {
        assert!(matches!(classify(401, "{}", "k"), LedgerError::Unauthorized { .. }));
        match classify(502, "<html>bad gateway</html>", "k") {
            LedgerError::Rejected { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("bad gateway"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
