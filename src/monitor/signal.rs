//! Raw signals delivered by the host's region tracker.

use serde::{Deserialize, Serialize};

use crate::region::Direction;

/// Host-reported transition type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Boundary crossed inwards.
    Enter,
    /// Boundary crossed outwards.
    Exit,
    /// Anything else the host sent.
    Other(String),
}

impl SignalKind {
    /// Maps the numeric event type used by mobile geofencing APIs
    /// (`1` = enter, `2` = exit).
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Enter,
            2 => Self::Exit,
            other => Self::Other(other.to_string()),
        }
    }

    /// Direction of the signal. Unrecognised kinds count as ENTER rather
    /// than being dropped.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Exit => Direction::Exit,
            Self::Enter | Self::Other(_) => Direction::Enter,
        }
    }
}

/// One invocation payload of the background handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignal {
    /// Platform-reported error; no record is ever built from an error signal.
    #[serde(default)]
    pub error: Option<String>,
    /// Transition type.
    pub kind: SignalKind,
    /// Identifier of the region that fired.
    #[serde(default)]
    pub region_identifier: Option<String>,
    /// Horizontal accuracy of the fix that triggered the signal.
    #[serde(default)]
    pub accuracy_meters: Option<f64>,
}

impl RawSignal {
    /// An ENTER signal for `region_identifier`.
    #[must_use]
    pub fn enter(region_identifier: impl Into<String>) -> Self {
        Self::new(SignalKind::Enter, Some(region_identifier.into()))
    }

    /// An EXIT signal for `region_identifier`.
    #[must_use]
    pub fn exit(region_identifier: impl Into<String>) -> Self {
        Self::new(SignalKind::Exit, Some(region_identifier.into()))
    }

    /// A signal of `kind`.
    #[must_use]
    pub fn new(kind: SignalKind, region_identifier: Option<String>) -> Self {
        Self {
            error: None,
            kind,
            region_identifier,
            accuracy_meters: None,
        }
    }

    /// An error-only signal.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            kind: SignalKind::Other("error".to_string()),
            region_identifier: None,
            accuracy_meters: None,
        }
    }

    /// Attaches a fix accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_meters = Some(meters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(SignalKind::from_code(1), SignalKind::Enter);
        assert_eq!(SignalKind::from_code(2), SignalKind::Exit);
        assert_eq!(SignalKind::from_code(7), SignalKind::Other("7".to_string()));
    }

    #[test]
    fn test_unknown_kind_defaults_to_enter() {
        assert_eq!(SignalKind::Other("dwell".to_string()).direction(), Direction::Enter);
        assert_eq!(SignalKind::Exit.direction(), Direction::Exit);
    }

    #[test]
    fn test_signal_from_host_json() {
        let signal: RawSignal = serde_json::from_str(
            r#"{"kind":"exit","regionIdentifier":"event:E1","accuracyMeters":8.0}"#,
        )
        .unwrap();
        assert_eq!(signal, RawSignal::exit("event:E1").with_accuracy(8.0));
    }
}
