//! Language-neutral request and response shapes.

use fleetgrid_placement::FailureKind;
use fleetgrid_state::{epoch_secs, HostId, ProfileId};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// A compute or volume placement request.
///
/// A request carrying `volume_size` is a volume request; anything else is a
/// compute request for `resource_profile_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    #[serde(default)]
    pub resource_profile_id: Option<ProfileId>,
    /// Instances to place; defaults to one.
    #[serde(default)]
    pub num_instances: Option<u32>,
    /// `zone` or `zone:host`. Only volume placement reads it.
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Volume size in gigabytes.
    #[serde(default)]
    pub volume_size: Option<u64>,
    #[serde(default)]
    pub pinned_host: Option<String>,
}

impl PlacementRequest {
    pub fn compute(profile_id: ProfileId) -> Self {
        Self {
            resource_profile_id: Some(profile_id),
            ..Self::default()
        }
    }

    pub fn volume(size_gb: u64) -> Self {
        Self {
            volume_size: Some(size_gb),
            ..Self::default()
        }
    }

    pub fn with_instances(mut self, count: u32) -> Self {
        self.num_instances = Some(count);
        self
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = Some(zone.into());
        self
    }

    pub fn pinned_to(mut self, host: impl Into<String>) -> Self {
        self.pinned_host = Some(host.into());
        self
    }

    pub fn is_volume(&self) -> bool {
        self.volume_size.is_some()
    }
}

/// A host chosen for one instance or volume.
///
/// Nothing is reserved on the host. The caller must claim the resources
/// before acting on the decision, and may find them gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TentativePlacement {
    pub host: HostId,
    /// Profile the host was chosen for; `None` for volumes.
    pub profile_id: Option<ProfileId>,
    /// Unix timestamp of the decision.
    pub decided_at: u64,
}

impl TentativePlacement {
    pub fn new(host: HostId, profile_id: Option<ProfileId>) -> Self {
        Self {
            host,
            profile_id,
            decided_at: epoch_secs(),
        }
    }
}

/// Outcome of [`Scheduler::place`](crate::Scheduler::place).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlacementResponse {
    Placed {
        /// First selection.
        selected_host: HostId,
        /// One entry per placed instance, in placement order.
        selected_hosts: Vec<HostId>,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

impl PlacementResponse {
    pub fn is_placed(&self) -> bool {
        matches!(self, PlacementResponse::Placed { .. })
    }
}

impl From<&SchedulerError> for PlacementResponse {
    fn from(err: &SchedulerError) -> Self {
        PlacementResponse::Failed {
            kind: err.kind(),
            reason: err.reason(),
        }
    }
}

impl From<Vec<TentativePlacement>> for PlacementResponse {
    fn from(placements: Vec<TentativePlacement>) -> Self {
        let selected_hosts: Vec<HostId> = placements.into_iter().map(|p| p.host).collect();
        match selected_hosts.first() {
            Some(first) => PlacementResponse::Placed {
                selected_host: first.clone(),
                selected_hosts,
            },
            None => PlacementResponse::Failed {
                kind: FailureKind::NoValidHost,
                reason: "nothing was placed".into(),
            },
        }
    }
}
