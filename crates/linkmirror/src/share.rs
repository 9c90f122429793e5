//! Shared-link lifecycle state and the status a host reports for a mirror.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a shared-link job.
///
/// `Pending` and `Created` are still being worked on by the host;
/// `Ok` and `Error` are terminal for the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareState {
    Pending,
    Created,
    Ok,
    Error,
}

impl ShareState {
    /// States the reconciler still scans for.
    pub const RECONCILABLE: [ShareState; 2] = [ShareState::Pending, ShareState::Created];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareState::Pending => "pending",
            ShareState::Created => "created",
            ShareState::Ok => "ok",
            ShareState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShareState::Ok | ShareState::Error)
    }
}

impl fmt::Display for ShareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host's current view of one mirrored link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareStatus {
    pub state: ShareState,
    /// Who the host recorded as the creator of the mirror.
    #[serde(default)]
    pub created_by: String,
    /// Size of the mirrored content in bytes.
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub visitor: i32,
    #[serde(default)]
    pub stored: i32,
    #[serde(default)]
    pub revenue: i64,
    #[serde(default)]
    pub title: String,
    /// When the host created the mirror.
    pub created_at: DateTime<Utc>,
    /// URL of the hosted mirror; empty until the host has one.
    #[serde(default)]
    pub host_shared_link: String,
}

#[derive(Debug, Error)]
#[error("unknown share state '{0}'")]
pub struct UnknownShareState(pub String);

impl FromStr for ShareState {
    type Err = UnknownShareState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShareState::Pending),
            "created" => Ok(ShareState::Created),
            "ok" => Ok(ShareState::Ok),
            "error" => Ok(ShareState::Error),
            other => Err(UnknownShareState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_states() {
        for state in [
            ShareState::Pending,
            ShareState::Created,
            ShareState::Ok,
            ShareState::Error,
        ] {
            assert_eq!(state.as_str().parse::<ShareState>().unwrap(), state);
        }
    }

    #[test]
    fn test_parse_unknown_state() {
        let err = "OK".parse::<ShareState>().unwrap_err();
        assert_eq!(err.0, "OK");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ShareState::Pending.is_terminal());
        assert!(!ShareState::Created.is_terminal());
        assert!(ShareState::Ok.is_terminal());
        assert!(ShareState::Error.is_terminal());
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&ShareState::Created).unwrap();
        assert_eq!(json, "\"created\"");
        let state: ShareState = serde_json::from_str("\"ok\"").unwrap();
        assert_eq!(state, ShareState::Ok);
    }
}
