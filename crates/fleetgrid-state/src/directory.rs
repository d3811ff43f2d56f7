//! Contracts of the external collaborators consumed by the placement engine.
//!
//! Every call is a potential suspension point (network I/O in a real
//! deployment). Implementations must be `Send + Sync` so a single
//! directory can serve concurrent placement requests.

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::types::*;

/// Read-only view of the resource-profile catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up a profile by id, including its extra specs.
    async fn get_resource_profile(&self, id: ProfileId) -> DirectoryResult<ResourceProfile>;

    /// List every profile in the catalog.
    async fn list_resource_profiles(&self) -> DirectoryResult<Vec<ResourceProfile>>;
}

/// Service liveness and capability lookups.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// All services registered for `topic`, disabled ones included.
    async fn list_services(&self, topic: &str) -> DirectoryResult<Vec<ServiceRecord>>;

    /// A single service by host and topic.
    async fn get_service(&self, host: &str, topic: &str) -> DirectoryResult<Option<ServiceRecord>>;

    /// Latest capability advertisement of `host`.
    async fn get_capability_report(&self, host: &str) -> DirectoryResult<Option<HostCapabilities>>;

    /// Enabled volume services with their committed gigabytes, least loaded first.
    async fn list_volume_services_by_load(&self) -> DirectoryResult<Vec<VolumeServiceLoad>>;
}

/// Write path used by hosts to publish their capabilities.
///
/// The placement engine never calls this.
#[async_trait]
pub trait CapabilityPublisher: Send + Sync {
    async fn update_capabilities(
        &self,
        service_name: &str,
        host: &str,
        report: CapabilityReport,
    ) -> DirectoryResult<()>;
}
