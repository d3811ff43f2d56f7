//! Placement error types.

use fleetgrid_state::DirectoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors that end a placement attempt.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// No host satisfies the constraints or the quota.
    #[error("no valid host was found: {reason}")]
    NoValidHost { reason: String },

    /// An explicitly pinned host is not up.
    #[error("host {host} is not up; will not schedule")]
    WillNotSchedule { host: String },

    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(#[from] DirectoryError),

    #[error("invalid placement config: {0}")]
    InvalidConfig(String),
}

impl PlacementError {
    pub fn no_valid_host(reason: impl Into<String>) -> Self {
        PlacementError::NoValidHost {
            reason: reason.into(),
        }
    }

    /// Language-neutral classification of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            PlacementError::NoValidHost { .. } => FailureKind::NoValidHost,
            PlacementError::WillNotSchedule { .. } => FailureKind::WillNotSchedule,
            PlacementError::DirectoryUnavailable(_) => FailureKind::DirectoryUnavailable,
            PlacementError::InvalidConfig(_) => FailureKind::InvalidRequest,
        }
    }
}

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoValidHost,
    WillNotSchedule,
    DirectoryUnavailable,
    InvalidRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_variant() {
        assert_eq!(
            PlacementError::no_valid_host("empty").kind(),
            FailureKind::NoValidHost
        );
        let err: PlacementError = DirectoryError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), FailureKind::DirectoryUnavailable);
    }

    #[test]
    fn reason_is_in_message() {
        let err = PlacementError::no_valid_host("All hosts have too many gigabytes");
        assert_eq!(
            err.to_string(),
            "no valid host was found: All hosts have too many gigabytes"
        );
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::WillNotSchedule).unwrap();
        assert_eq!(json, "\"will_not_schedule\"");
    }
}
