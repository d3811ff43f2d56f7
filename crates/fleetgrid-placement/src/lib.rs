//! fleetgrid-placement: host selection for compute and volume requests.
//!
//! Every decision is computed from a fresh snapshot pulled from the
//! [`ServiceDirectory`](fleetgrid_state::ServiceDirectory); nothing is
//! cached between calls and nothing is reserved. Selections are tentative
//! and the caller claims resources afterwards.
//!
//! # Components
//!
//! - **`capability`**: flattens raw capability reports
//! - **`constraint`**: operator language, match modes, unified constraints
//! - **`filter`**: per-host liveness and extra-spec admission
//! - **`compute`**: architecture-aware random placement
//! - **`volume`**: least-loaded placement under a gigabyte quota
//! - **`config`**: scheduler ceilings and modes

pub mod capability;
pub mod compute;
pub mod config;
pub mod constraint;
pub mod error;
pub mod filter;
pub mod volume;

pub use capability::{
    CapabilityError, CapabilityMode, CapabilityValue, NormalizedCapability, normalize,
};
pub use compute::ArchitecturePolicy;
pub use config::PlacementConfig;
pub use constraint::{matches, matches_with, Constraint, ConstraintError, MatchMode, Requirement};
pub use error::{FailureKind, PlacementError, PlacementResult};
pub use filter::{ComputeFilter, FilterProperties, HostFilter, HostState};
pub use volume::{VolumePolicy, VolumeRequest};
