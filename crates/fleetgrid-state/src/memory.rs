//! In-memory catalog and service directory.
//!
//! Implements every collaborator trait over a single `RwLock`-guarded map
//! set. Embedders use it for single-process fleets; the test suites use it
//! as the fleet fixture.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::directory::{CapabilityPublisher, CatalogStore, ServiceDirectory};
use crate::error::{DirectoryError, DirectoryResult};
use crate::profiles::default_profiles;
use crate::types::*;

#[derive(Default)]
struct Inner {
    profiles: BTreeMap<ProfileId, ResourceProfile>,
    /// Keyed by (host, topic).
    services: BTreeMap<(HostId, String), ServiceRecord>,
    capabilities: BTreeMap<HostId, HostCapabilities>,
    /// Committed volume gigabytes per host.
    volume_gigabytes: BTreeMap<HostId, u64>,
    /// When set, every read fails with `DirectoryError::Unavailable`.
    outage: Option<String>,
}

impl Inner {
    fn check_available(&self) -> DirectoryResult<()> {
        match &self.outage {
            Some(reason) => Err(DirectoryError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory directory. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose catalog holds the static seed profiles.
    pub fn with_default_profiles() -> Self {
        let mut inner = Inner::default();
        for profile in default_profiles() {
            inner.profiles.insert(profile.id, profile);
        }
        debug!(count = inner.profiles.len(), "seeded default resource profiles");
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    // ── Catalog ────────────────────────────────────────────────────

    /// Insert or replace a profile. `flavorid` and `name` must stay unique.
    pub async fn put_profile(&self, profile: ResourceProfile) -> DirectoryResult<()> {
        let mut inner = self.inner.write().await;
        let clash = inner.profiles.values().find(|p| {
            p.id != profile.id && (p.flavorid == profile.flavorid || p.name == profile.name)
        });
        if let Some(existing) = clash {
            return Err(DirectoryError::Conflict(format!(
                "profile {} clashes with {} (flavorid {}, name {})",
                profile.id, existing.id, profile.flavorid, profile.name
            )));
        }
        debug!(id = profile.id, name = %profile.name, "resource profile stored");
        inner.profiles.insert(profile.id, profile);
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Register (or replace) a service record.
    pub async fn register_service(&self, record: ServiceRecord) {
        let mut inner = self.inner.write().await;
        info!(host = %record.host, topic = %record.topic, "service registered");
        inner
            .services
            .insert((record.host.clone(), record.topic.clone()), record);
    }

    /// Refresh the heartbeat of a service. Returns false if it is unknown.
    pub async fn heartbeat(&self, host: &str, topic: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(&(host.to_string(), topic.to_string())) {
            Some(record) => {
                record.last_heartbeat = epoch_secs();
                true
            }
            None => {
                warn!(%host, %topic, "heartbeat from unknown service");
                false
            }
        }
    }

    /// Enable or disable a service. Returns false if it is unknown.
    pub async fn set_disabled(&self, host: &str, topic: &str, disabled: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(&(host.to_string(), topic.to_string())) {
            Some(record) => {
                record.disabled = disabled;
                info!(%host, %topic, disabled, "service availability changed");
                true
            }
            None => false,
        }
    }

    /// Record the gigabytes already committed to a volume host.
    pub async fn set_committed_gigabytes(&self, host: &str, gigabytes: u64) {
        let mut inner = self.inner.write().await;
        inner.volume_gigabytes.insert(host.to_string(), gigabytes);
    }

    /// Simulate an outage: every lookup fails until cleared with `None`.
    pub async fn set_outage(&self, reason: Option<String>) {
        self.inner.write().await.outage = reason;
    }
}

#[async_trait]
impl CatalogStore for MemoryDirectory {
    async fn get_resource_profile(&self, id: ProfileId) -> DirectoryResult<ResourceProfile> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        inner
            .profiles
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::ProfileNotFound(id))
    }

    async fn list_resource_profiles(&self) -> DirectoryResult<Vec<ResourceProfile>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner.profiles.values().cloned().collect())
    }
}

#[async_trait]
impl ServiceDirectory for MemoryDirectory {
    async fn list_services(&self, topic: &str) -> DirectoryResult<Vec<ServiceRecord>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner
            .services
            .values()
            .filter(|s| s.topic == topic)
            .cloned()
            .collect())
    }

    async fn get_service(&self, host: &str, topic: &str) -> DirectoryResult<Option<ServiceRecord>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner
            .services
            .get(&(host.to_string(), topic.to_string()))
            .cloned())
    }

    async fn get_capability_report(&self, host: &str) -> DirectoryResult<Option<HostCapabilities>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner.capabilities.get(host).cloned())
    }

    async fn list_volume_services_by_load(&self) -> DirectoryResult<Vec<VolumeServiceLoad>> {
        let inner = self.inner.read().await;
        inner.check_available()?;
        let mut loads: Vec<VolumeServiceLoad> = inner
            .services
            .values()
            .filter(|s| s.topic == VOLUME_TOPIC && !s.disabled)
            .map(|s| VolumeServiceLoad {
                service: s.clone(),
                committed_gb: inner.volume_gigabytes.get(&s.host).copied().unwrap_or(0),
            })
            .collect();
        loads.sort_by(|a, b| {
            a.committed_gb
                .cmp(&b.committed_gb)
                .then_with(|| a.service.host.cmp(&b.service.host))
        });
        Ok(loads)
    }
}

#[async_trait]
impl CapabilityPublisher for MemoryDirectory {
    async fn update_capabilities(
        &self,
        service_name: &str,
        host: &str,
        report: CapabilityReport,
    ) -> DirectoryResult<()> {
        let mut inner = self.inner.write().await;
        let now = epoch_secs();

        let entry = inner
            .capabilities
            .entry(host.to_string())
            .or_insert_with(|| HostCapabilities::new(host));
        entry.topics.insert(service_name.to_string(), report);
        entry.updated_at = now;

        if let Some(record) = inner
            .services
            .get_mut(&(host.to_string(), service_name.to_string()))
        {
            record.last_heartbeat = now;
        }

        debug!(%host, service = service_name, "capabilities updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn default_profiles_are_queryable() {
        let dir = MemoryDirectory::with_default_profiles();
        let profiles = dir.list_resource_profiles().await.unwrap();
        assert_eq!(profiles.len(), 21);

        let tiny = dir.get_resource_profile(1).await.unwrap();
        assert_eq!(tiny.name, "m1.tiny");
    }

    #[tokio::test]
    async fn missing_profile_is_reported() {
        let dir = MemoryDirectory::new();
        let err = dir.get_resource_profile(42).await.unwrap_err();
        assert!(matches!(err, DirectoryError::ProfileNotFound(42)));
    }

    #[tokio::test]
    async fn duplicate_flavorid_or_name_is_rejected() {
        let dir = MemoryDirectory::new();
        dir.put_profile(ResourceProfile::new(1, 10, "a", 1, 512, 1))
            .await
            .unwrap();

        let same_flavor = dir
            .put_profile(ResourceProfile::new(2, 10, "b", 1, 512, 1))
            .await;
        assert!(matches!(same_flavor, Err(DirectoryError::Conflict(_))));

        let same_name = dir
            .put_profile(ResourceProfile::new(3, 11, "a", 1, 512, 1))
            .await;
        assert!(matches!(same_name, Err(DirectoryError::Conflict(_))));

        // Replacing a profile under its own id is allowed.
        dir.put_profile(ResourceProfile::new(1, 10, "a", 2, 1024, 1))
            .await
            .unwrap();
        assert_eq!(dir.get_resource_profile(1).await.unwrap().vcpus, 2);
    }

    #[tokio::test]
    async fn volume_services_sorted_by_load_without_disabled() {
        let dir = MemoryDirectory::new();
        for (host, gb) in [("v1", 30), ("v2", 10), ("v3", 20)] {
            dir.register_service(ServiceRecord::new(host, VOLUME_TOPIC)).await;
            dir.set_committed_gigabytes(host, gb).await;
        }
        dir.set_disabled("v3", VOLUME_TOPIC, true).await;

        let loads = dir.list_volume_services_by_load().await.unwrap();
        let hosts: Vec<_> = loads.iter().map(|l| l.service.host.as_str()).collect();
        assert_eq!(hosts, vec!["v2", "v1"]);
        assert_eq!(loads[0].committed_gb, 10);
    }

    #[tokio::test]
    async fn capability_update_refreshes_heartbeat() {
        let dir = MemoryDirectory::new();
        let mut record = ServiceRecord::new("c1", COMPUTE_TOPIC);
        record.last_heartbeat = 0;
        dir.register_service(record).await;

        let mut report = CapabilityReport::new();
        report.insert("vcpus".into(), json!(8));
        dir.update_capabilities(COMPUTE_TOPIC, "c1", report).await.unwrap();

        let caps = dir.get_capability_report("c1").await.unwrap().unwrap();
        assert_eq!(caps.for_topic(COMPUTE_TOPIC).unwrap()["vcpus"], json!(8));

        let svc = dir.get_service("c1", COMPUTE_TOPIC).await.unwrap().unwrap();
        assert!(svc.last_heartbeat > 0);
    }

    #[tokio::test]
    async fn outage_fails_every_lookup() {
        let dir = MemoryDirectory::with_default_profiles();
        dir.set_outage(Some("link down".into())).await;

        assert!(matches!(
            dir.list_services(COMPUTE_TOPIC).await,
            Err(DirectoryError::Unavailable(_))
        ));
        assert!(dir.get_resource_profile(1).await.is_err());

        dir.set_outage(None).await;
        assert!(dir.get_resource_profile(1).await.is_ok());
    }
}
