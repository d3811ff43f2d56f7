//! Error types for the catalog and service directory.

use thiserror::Error;

use crate::types::ProfileId;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors surfaced by the external catalog and service directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("resource profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("conflict: {0}")]
    Conflict(String),
}
