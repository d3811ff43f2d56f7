//! Scheduler: resolves requests into host selections.
//!
//! The `Scheduler` is the entry point callers use:
//! - Looks up the requested resource profile in the catalog
//! - Runs one compute selection per requested instance, in sequence
//! - Dispatches volume requests to the volume policy
//! - Folds failures into a [`PlacementResponse`] for language-neutral callers

use std::sync::Arc;

use fleetgrid_placement::{ArchitecturePolicy, PlacementConfig, VolumePolicy, VolumeRequest};
use fleetgrid_state::*;
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::request::{PlacementRequest, PlacementResponse, TentativePlacement};

/// Largest `num_instances` accepted in one request.
pub const MAX_INSTANCES_PER_REQUEST: u32 = 1_000;

/// Placement front end over a catalog and a service directory.
///
/// Holds no mutable state; one instance can serve concurrent requests.
pub struct Scheduler {
    catalog: Arc<dyn CatalogStore>,
    directory: Arc<dyn ServiceDirectory>,
    compute: ArchitecturePolicy,
    volume: VolumePolicy,
}

impl Scheduler {
    /// Create a scheduler. Fails if `config` does not validate.
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        directory: Arc<dyn ServiceDirectory>,
        config: PlacementConfig,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        debug!(?config, "scheduler configured");
        Ok(Self {
            catalog,
            directory,
            compute: ArchitecturePolicy::new(config.clone()),
            volume: VolumePolicy::new(config),
        })
    }

    pub fn config(&self) -> &PlacementConfig {
        self.compute.config()
    }

    /// Place `num_instances` instances of the requested profile.
    ///
    /// Each instance is placed against a fresh directory snapshot, so the
    /// same host may be chosen more than once. The first failure aborts the
    /// request and discards earlier selections.
    pub async fn schedule_run_instance(
        &self,
        context: &RequestContext,
        request: &PlacementRequest,
    ) -> SchedulerResult<Vec<TentativePlacement>> {
        let profile_id = request.resource_profile_id.ok_or_else(|| {
            SchedulerError::InvalidRequest("resource_profile_id is required".into())
        })?;
        let count = request.num_instances.unwrap_or(1);
        if count == 0 {
            return Err(SchedulerError::InvalidRequest(
                "num_instances must be at least 1".into(),
            ));
        }
        if count > MAX_INSTANCES_PER_REQUEST {
            return Err(SchedulerError::InvalidRequest(format!(
                "num_instances {count} exceeds the limit of {MAX_INSTANCES_PER_REQUEST}"
            )));
        }

        let profile = self.resolve_profile(profile_id).await?;
        let elevated = context.elevated();

        let mut placements = Vec::new();
        for index in 0..count {
            let host = self
                .compute
                .select_compute_host(self.directory.as_ref(), &elevated, COMPUTE_TOPIC, &profile)
                .await?;
            debug!(%host, index, profile = %profile.name, "instance placed");
            placements.push(TentativePlacement::new(host, Some(profile.id)));
        }

        info!(
            profile = %profile.name,
            instances = count,
            hosts = ?placements.iter().map(|p| p.host.as_str()).collect::<Vec<_>>(),
            "run_instance scheduled"
        );
        Ok(placements)
    }

    /// Place one volume of `volume_size` gigabytes.
    pub async fn schedule_create_volume(
        &self,
        context: &RequestContext,
        request: &PlacementRequest,
    ) -> SchedulerResult<TentativePlacement> {
        let size_gb = request
            .volume_size
            .ok_or_else(|| SchedulerError::InvalidRequest("volume_size is required".into()))?;
        if size_gb == 0 {
            return Err(SchedulerError::InvalidRequest(
                "volume_size must be positive".into(),
            ));
        }

        let volume_request = VolumeRequest {
            size_gb,
            availability_zone: request.availability_zone.clone(),
            pinned_host: request.pinned_host.clone(),
        };
        let host = self
            .volume
            .select_volume_host(self.directory.as_ref(), context, &volume_request)
            .await?;
        Ok(TentativePlacement::new(host, None))
    }

    /// Serve a request of either kind. Never fails; errors become
    /// [`PlacementResponse::Failed`].
    pub async fn place(
        &self,
        context: &RequestContext,
        request: &PlacementRequest,
    ) -> PlacementResponse {
        let result = if request.is_volume() {
            self.schedule_create_volume(context, request)
                .await
                .map(|placement| vec![placement])
        } else {
            self.schedule_run_instance(context, request).await
        };

        match result {
            Ok(placements) => placements.into(),
            Err(err) => {
                warn!(kind = ?err.kind(), %err, "placement failed");
                PlacementResponse::from(&err)
            }
        }
    }

    async fn resolve_profile(&self, id: ProfileId) -> SchedulerResult<ResourceProfile> {
        match self.catalog.get_resource_profile(id).await {
            Ok(profile) => Ok(profile),
            Err(DirectoryError::ProfileNotFound(id)) => Err(SchedulerError::ProfileNotFound(id)),
            Err(err) => Err(SchedulerError::Placement(err.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgrid_placement::{FailureKind, PlacementError};

    fn scheduler(dir: &MemoryDirectory) -> Scheduler {
        Scheduler::new(
            Arc::new(dir.clone()),
            Arc::new(dir.clone()),
            PlacementConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = MemoryDirectory::new();
        let config = PlacementConfig {
            max_gigabytes: 0,
            ..PlacementConfig::default()
        };
        let result = Scheduler::new(Arc::new(dir.clone()), Arc::new(dir), config);
        assert!(matches!(
            result,
            Err(SchedulerError::Placement(PlacementError::InvalidConfig(_)))
        ));
    }

    #[tokio::test]
    async fn zero_instances_is_invalid() {
        let dir = MemoryDirectory::with_default_profiles();
        let req = PlacementRequest::compute(1).with_instances(0);
        let err = scheduler(&dir)
            .schedule_run_instance(&RequestContext::default(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn instance_count_is_bounded() {
        let dir = MemoryDirectory::with_default_profiles();
        let sched = scheduler(&dir);
        let req = PlacementRequest::compute(1).with_instances(MAX_INSTANCES_PER_REQUEST + 1);
        let err = sched
            .schedule_run_instance(&RequestContext::default(), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));

        let huge: PlacementRequest =
            serde_json::from_str(r#"{"resource_profile_id":1,"num_instances":4000000000}"#)
                .unwrap();
        match sched.place(&RequestContext::default(), &huge).await {
            PlacementResponse::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::InvalidRequest);
                assert!(reason.contains("4000000000"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_profile_id_is_invalid() {
        let dir = MemoryDirectory::with_default_profiles();
        let err = scheduler(&dir)
            .schedule_run_instance(&RequestContext::default(), &PlacementRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
    }

    #[tokio::test]
    async fn unknown_profile_is_reported() {
        let dir = MemoryDirectory::with_default_profiles();
        let err = scheduler(&dir)
            .schedule_run_instance(&RequestContext::default(), &PlacementRequest::compute(999))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ProfileNotFound(999)));
    }

    #[tokio::test]
    async fn catalog_outage_is_directory_unavailable() {
        let dir = MemoryDirectory::with_default_profiles();
        dir.set_outage(Some("catalog offline".into())).await;
        let err = scheduler(&dir)
            .schedule_run_instance(&RequestContext::default(), &PlacementRequest::compute(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::DirectoryUnavailable);
    }

    #[tokio::test]
    async fn volume_request_needs_positive_size() {
        let dir = MemoryDirectory::new();
        let sched = scheduler(&dir);
        let ctx = RequestContext::default();

        let err = sched
            .schedule_create_volume(&ctx, &PlacementRequest::compute(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));

        let err = sched
            .schedule_create_volume(&ctx, &PlacementRequest::volume(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest(_)));
    }
}
