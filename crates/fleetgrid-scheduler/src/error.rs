//! Scheduler error types.

use fleetgrid_placement::{FailureKind, PlacementError};
use fleetgrid_state::ProfileId;
use thiserror::Error;

/// Errors that can occur while serving a placement request.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("resource profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SchedulerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SchedulerError::Placement(err) => err.kind(),
            SchedulerError::ProfileNotFound(_) | SchedulerError::InvalidRequest(_) => {
                FailureKind::InvalidRequest
            }
        }
    }

    /// Human-readable reason carried in a failed response.
    pub fn reason(&self) -> String {
        match self {
            SchedulerError::Placement(PlacementError::NoValidHost { reason }) => reason.clone(),
            other => other.to_string(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
