//! fleetgrid-scheduler: request facade over the placement engine.
//!
//! Resolves resource profiles from the catalog and turns a
//! [`PlacementRequest`] into tentative host selections:
//!
//! - Compute requests place `num_instances` instances one after another
//! - Volume requests go to the least-loaded volume host under quota
//! - [`Scheduler::place`] folds every failure into a [`PlacementResponse`]
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── CatalogStore (resource profiles)
//!   ├── ServiceDirectory (liveness, capabilities, volume load)
//!   ├── ArchitecturePolicy (compute)
//!   └── VolumePolicy (volume)
//! ```

pub mod error;
pub mod request;
pub mod scheduler;
pub mod telemetry;

pub use error::{SchedulerError, SchedulerResult};
pub use request::{PlacementRequest, PlacementResponse, TentativePlacement};
pub use scheduler::{MAX_INSTANCES_PER_REQUEST, Scheduler};
