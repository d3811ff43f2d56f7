//! fleetgrid-state: shared domain types and collaborator contracts.
//!
//! The placement engine never owns fleet state. It reads resource profiles
//! from a [`CatalogStore`] and host liveness and capability snapshots from a
//! [`ServiceDirectory`]. Hosts publish their capabilities through a
//! [`CapabilityPublisher`].
//!
//! [`MemoryDirectory`] implements all three in process, seeded with the
//! static profile table from [`profiles::default_profiles`].

pub mod directory;
pub mod error;
pub mod memory;
pub mod profiles;
pub mod types;

pub use directory::{CapabilityPublisher, CatalogStore, ServiceDirectory};
pub use error::{DirectoryError, DirectoryResult};
pub use memory::MemoryDirectory;
pub use types::*;
