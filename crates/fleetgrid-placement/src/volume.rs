//! Capacity-bounded volume placement.
//!
//! Volume hosts are walked from least to most committed gigabytes. The
//! quota is checked against each host in that order and the first
//! violation ends the attempt: once the least-loaded live host cannot take
//! the volume, no more-loaded host is tried.

use fleetgrid_state::{epoch_secs, HostId, RequestContext, ServiceDirectory, VOLUME_TOPIC};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PlacementConfig;
use crate::error::{PlacementError, PlacementResult};

/// A request to place one volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    pub size_gb: u64,
    /// `zone` or `zone:host`.
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Explicit host; takes precedence over a host in `availability_zone`.
    #[serde(default)]
    pub pinned_host: Option<String>,
}

impl VolumeRequest {
    pub fn new(size_gb: u64) -> Self {
        Self {
            size_gb,
            ..Self::default()
        }
    }

    /// Zone and pinned host, split out of `zone:host` if needed.
    pub fn target(&self) -> (Option<&str>, Option<&str>) {
        let (zone, host) = match self.availability_zone.as_deref() {
            Some(az) => match az.split_once(':') {
                Some((zone, host)) => (zone, Some(host)),
                None => (az, None),
            },
            None => ("", None),
        };
        let zone = (!zone.is_empty()).then_some(zone);
        let host = self.pinned_host.as_deref().or(host).filter(|h| !h.is_empty());
        (zone, host)
    }
}

/// Greedy least-loaded placement under a gigabyte quota.
#[derive(Debug, Clone)]
pub struct VolumePolicy {
    config: PlacementConfig,
}

impl VolumePolicy {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub async fn select_volume_host(
        &self,
        directory: &dyn ServiceDirectory,
        context: &RequestContext,
        request: &VolumeRequest,
    ) -> PlacementResult<HostId> {
        let down_time = self.config.service_down_time();
        let (zone, pinned) = request.target();

        match pinned {
            Some(host) if context.is_admin => {
                let service = directory.get_service(host, VOLUME_TOPIC).await?;
                let up = service.is_some_and(|s| s.is_up(down_time));
                if !up {
                    warn!(%host, "pinned volume host is not up");
                    return Err(PlacementError::WillNotSchedule {
                        host: host.to_string(),
                    });
                }
                info!(%host, size_gb = request.size_gb, "volume pinned to host");
                return Ok(host.to_string());
            }
            Some(host) => {
                debug!(%host, user = ?context.user_id, "host pinning requires admin; ignored");
            }
            None => {}
        }

        let mut loads = directory.list_volume_services_by_load().await?;
        loads.sort_by_key(|l| l.committed_gb);
        if let Some(zone) = zone {
            loads.retain(|l| l.service.availability_zone.as_deref() == Some(zone));
        }

        let now = epoch_secs();
        for load in &loads {
            let projected = load.committed_gb.saturating_add(request.size_gb);
            if projected > self.config.max_gigabytes {
                warn!(
                    host = %load.service.host,
                    committed_gb = load.committed_gb,
                    size_gb = request.size_gb,
                    max_gigabytes = self.config.max_gigabytes,
                    "volume quota exceeded"
                );
                return Err(PlacementError::no_valid_host(
                    "All hosts have too many gigabytes",
                ));
            }
            if load.service.is_up_at(now, down_time) && !load.service.disabled {
                info!(
                    host = %load.service.host,
                    committed_gb = load.committed_gb,
                    size_gb = request.size_gb,
                    "volume host selected"
                );
                return Ok(load.service.host.clone());
            }
            debug!(host = %load.service.host, "volume host is down; skipping");
        }

        Err(PlacementError::no_valid_host(
            "Is the appropriate service running?",
        ))
    }
}
