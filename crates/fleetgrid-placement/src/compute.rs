//! Architecture-aware compute placement.
//!
//! A host is a candidate for a profile when:
//! 1. its compute service is up and enabled,
//! 2. its `cpu_arch` satisfies the profile's `cpu_arch` extra spec (if any),
//! 3. free vcpus, free memory and free root disk cover the profile,
//! 4. every other extra spec matches under [`MatchMode::Capacity`].
//!
//! One candidate is then drawn uniformly at random. The choice is
//! tentative: nothing is reserved, so concurrent requests may pick the
//! same host and the caller must claim resources before creating the
//! instance.

use fleetgrid_state::{
    epoch_secs, HostId, RequestContext, ResourceProfile, ServiceDirectory, COMPUTE_TOPIC,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::capability::normalize;
use crate::config::PlacementConfig;
use crate::constraint::{base_constraints, extra_spec_constraints, matches_with, MatchMode};
use crate::error::{PlacementError, PlacementResult};
use crate::filter::{ComputeFilter, HostState};

/// Extra spec gating the candidate set by architecture.
pub const CPU_ARCH_KEY: &str = "cpu_arch";

/// Uniform-random placement over architecture-compatible hosts.
#[derive(Debug, Clone)]
pub struct ArchitecturePolicy {
    config: PlacementConfig,
    filter: ComputeFilter,
}

impl ArchitecturePolicy {
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            filter: ComputeFilter,
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Hosts of `topic` able to run one instance of `profile`, in directory order.
    pub async fn eligible_hosts(
        &self,
        directory: &dyn ServiceDirectory,
        context: &RequestContext,
        topic: &str,
        profile: &ResourceProfile,
    ) -> PlacementResult<Vec<HostId>> {
        let services = directory.list_services(topic).await?;
        let now = epoch_secs();
        let down_time = self.config.service_down_time();
        let wanted_arch = profile.extra_specs.get(CPU_ARCH_KEY);

        debug!(
            profile = %profile.name,
            user = ?context.user_id,
            vcpus = profile.vcpus,
            memory_mb = profile.memory_mb,
            root_gb = profile.root_gb,
            cpu_arch = ?wanted_arch,
            services = services.len(),
            "evaluating compute hosts"
        );

        let mut hosts = Vec::new();
        for service in services {
            let Some(report) = directory.get_capability_report(&service.host).await? else {
                debug!(host = %service.host, "no capability report");
                continue;
            };
            let Some(compute) = report.for_topic(COMPUTE_TOPIC) else {
                debug!(host = %service.host, "no compute capabilities advertised");
                continue;
            };
            let capabilities = match normalize(compute, self.config.capability_mode) {
                Ok(caps) => caps,
                Err(err) => {
                    warn!(host = %service.host, %err, "malformed capability report; host excluded");
                    continue;
                }
            };

            let up = service.is_up_at(now, down_time);
            let state = HostState::new(service, up, capabilities);
            if self.is_candidate(&state, profile) {
                debug!(host = %state.host, "host is a candidate");
                hosts.push(state.host);
            }
        }

        debug!(candidates = ?hosts, "compute candidates");
        Ok(hosts)
    }

    /// Pick one eligible host uniformly at random.
    pub async fn select_compute_host(
        &self,
        directory: &dyn ServiceDirectory,
        context: &RequestContext,
        topic: &str,
        profile: &ResourceProfile,
    ) -> PlacementResult<HostId> {
        let hosts = self.eligible_hosts(directory, context, topic, profile).await?;
        choose_host(hosts, profile, &mut rand::thread_rng())
    }

    /// As [`select_compute_host`](Self::select_compute_host) with a caller-supplied RNG.
    pub async fn select_compute_host_with<R: Rng + Send + ?Sized>(
        &self,
        directory: &dyn ServiceDirectory,
        context: &RequestContext,
        topic: &str,
        profile: &ResourceProfile,
        rng: &mut R,
    ) -> PlacementResult<HostId> {
        let hosts = self.eligible_hosts(directory, context, topic, profile).await?;
        choose_host(hosts, profile, rng)
    }

    fn is_candidate(&self, host: &HostState, profile: &ResourceProfile) -> bool {
        if !self.filter.service_available(host) {
            return false;
        }

        let caps = &host.capabilities;
        if let Some(wanted) = profile.extra_specs.get(CPU_ARCH_KEY) {
            if !matches_with(caps.get(CPU_ARCH_KEY), wanted, MatchMode::Exact) {
                debug!(
                    host = %host.host,
                    offered = ?caps.get(CPU_ARCH_KEY),
                    "architecture mismatch"
                );
                return false;
            }
        }

        if !self.config.skip_isolated_core_check {
            let used = caps.integer("vcpus_used").unwrap_or(0);
            if used.saturating_add(i64::from(profile.vcpus)) > i64::from(self.config.max_cores) {
                debug!(
                    host = %host.host,
                    used,
                    max_cores = self.config.max_cores,
                    "core ceiling reached"
                );
                return false;
            }
        }

        if let Some(failed) = base_constraints(profile)
            .iter()
            .find(|c| !c.evaluate(caps, MatchMode::Capacity))
        {
            debug!(host = %host.host, constraint = ?failed, "insufficient base resources");
            return false;
        }

        let skip = [CPU_ARCH_KEY];
        if let Some(failed) =
            extra_spec_constraints(profile, &skip).find(|c| !c.evaluate(caps, MatchMode::Capacity))
        {
            debug!(host = %host.host, constraint = ?failed, "extra spec not satisfied");
            return false;
        }

        true
    }
}

/// Uniform draw; an empty candidate set is a `NoValidHost` failure.
fn choose_host<R: Rng + ?Sized>(
    hosts: Vec<HostId>,
    profile: &ResourceProfile,
    rng: &mut R,
) -> PlacementResult<HostId> {
    match hosts.choose(rng) {
        Some(host) => {
            info!(
                %host,
                profile = %profile.name,
                candidates = hosts.len(),
                "compute host selected"
            );
            Ok(host.clone())
        }
        None => Err(PlacementError::no_valid_host(format!(
            "no compute host satisfies profile {}",
            profile.name
        ))),
    }
}
