//! Per-host pass/fail filtering.

use fleetgrid_state::{ResourceProfile, ServiceRecord, COMPUTE_TOPIC};
use tracing::debug;

use crate::capability::NormalizedCapability;
use crate::constraint::{extra_spec_constraints, MatchMode};

/// Point-in-time view of one host for one topic.
#[derive(Debug, Clone)]
pub struct HostState {
    pub host: String,
    pub topic: String,
    pub service: ServiceRecord,
    /// Heartbeat freshness evaluated when the snapshot was taken.
    pub service_up: bool,
    pub capabilities: NormalizedCapability,
}

impl HostState {
    pub fn new(
        service: ServiceRecord,
        service_up: bool,
        capabilities: NormalizedCapability,
    ) -> Self {
        Self {
            host: service.host.clone(),
            topic: service.topic.clone(),
            service,
            service_up,
            capabilities,
        }
    }
}

/// What a filter sees of the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterProperties<'a> {
    pub resource_profile: Option<&'a ResourceProfile>,
}

/// A per-host admission check.
pub trait HostFilter: Send + Sync {
    fn host_passes(&self, host: &HostState, props: &FilterProperties<'_>) -> bool;
}

/// Admits compute hosts that are alive, enabled and satisfy every extra spec.
///
/// Base resource numbers are not checked here; the compute policy owns them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeFilter;

impl ComputeFilter {
    /// Service is up, not disabled, and not disabled through its capabilities.
    pub fn service_available(&self, host: &HostState) -> bool {
        if !host.service_up || host.service.disabled {
            debug!(host = %host.host, "host is disabled or has not been heard from in a while");
            return false;
        }
        if !host.capabilities.is_enabled() {
            debug!(host = %host.host, "host is disabled via capabilities");
            return false;
        }
        true
    }

    /// Every extra spec of `profile` is advertised and matches.
    pub fn satisfies_extra_specs(
        &self,
        capabilities: &NormalizedCapability,
        profile: &ResourceProfile,
    ) -> bool {
        extra_spec_constraints(profile, &[])
            .all(|c| c.evaluate(capabilities, MatchMode::Containment))
    }
}

impl HostFilter for ComputeFilter {
    fn host_passes(&self, host: &HostState, props: &FilterProperties<'_>) -> bool {
        let Some(profile) = props.resource_profile else {
            return true;
        };
        if host.topic != COMPUTE_TOPIC {
            return true;
        }
        if !self.service_available(host) {
            return false;
        }
        if !self.satisfies_extra_specs(&host.capabilities, profile) {
            debug!(
                host = %host.host,
                profile = %profile.name,
                "host fails extra_specs requirements"
            );
            return false;
        }
        true
    }
}
