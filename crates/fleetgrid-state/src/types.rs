//! Domain types shared by the catalog, the service directory and the
//! placement engine.
//!
//! All types are serializable so the external collaborators can hand them
//! over as JSON without an intermediate representation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of a physical host in the fleet.
pub type HostId = String;

/// Catalog identifier of a resource profile.
pub type ProfileId = u32;

/// Service topic for compute hosts.
pub const COMPUTE_TOPIC: &str = "compute";

/// Service topic for volume hosts.
pub const VOLUME_TOPIC: &str = "volume";

// ── Resource profile ───────────────────────────────────────────────

/// A named bundle of compute resources plus extended constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceProfile {
    pub id: ProfileId,
    /// Public flavor identifier, unique across the catalog.
    pub flavorid: u32,
    /// Display name, unique across the catalog.
    pub name: String,
    pub vcpus: u32,
    pub memory_mb: u64,
    /// Root disk size in gigabytes.
    #[serde(alias = "local_gb")]
    pub root_gb: u64,
    #[serde(default)]
    pub swap: u64,
    #[serde(default)]
    pub rxtx_quota: u64,
    #[serde(default)]
    pub rxtx_cap: u64,
    /// Extended constraints matched against host capabilities.
    #[serde(default)]
    pub extra_specs: BTreeMap<String, SpecValue>,
}

impl ResourceProfile {
    /// Build a profile with no extended constraints.
    pub fn new(
        id: ProfileId,
        flavorid: u32,
        name: impl Into<String>,
        vcpus: u32,
        memory_mb: u64,
        root_gb: u64,
    ) -> Self {
        Self {
            id,
            flavorid,
            name: name.into(),
            vcpus,
            memory_mb,
            root_gb,
            swap: 0,
            rxtx_quota: 0,
            rxtx_cap: 0,
            extra_specs: BTreeMap::new(),
        }
    }

    /// Attach an extended constraint (builder style).
    pub fn with_extra_spec(mut self, key: impl Into<String>, value: impl Into<SpecValue>) -> Self {
        self.extra_specs.insert(key.into(), value.into());
        self
    }
}

/// Value of a single extra spec.
///
/// Non-text scalars compare by equality. Text may carry an operator
/// expression such as `">= 4"`, `"s== x86_64"` or `"<or> a <or> b"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SpecValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SpecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecValue::Bool(b) => write!(f, "{b}"),
            SpecValue::Integer(n) => write!(f, "{n}"),
            SpecValue::Float(x) => write!(f, "{x}"),
            SpecValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SpecValue {
    fn from(value: &str) -> Self {
        SpecValue::Text(value.to_string())
    }
}

impl From<String> for SpecValue {
    fn from(value: String) -> Self {
        SpecValue::Text(value)
    }
}

impl From<i64> for SpecValue {
    fn from(value: i64) -> Self {
        SpecValue::Integer(value)
    }
}

impl From<bool> for SpecValue {
    fn from(value: bool) -> Self {
        SpecValue::Bool(value)
    }
}

impl From<f64> for SpecValue {
    fn from(value: f64) -> Self {
        SpecValue::Float(value)
    }
}

// ── Services ───────────────────────────────────────────────────────

/// Liveness record of one service (host + topic).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub host: HostId,
    pub topic: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Unix timestamp (seconds) of the last heartbeat.
    pub last_heartbeat: u64,
}

impl ServiceRecord {
    /// A freshly heartbeated, enabled service.
    pub fn new(host: impl Into<HostId>, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            topic: topic.into(),
            disabled: false,
            availability_zone: None,
            last_heartbeat: epoch_secs(),
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = Some(zone.into());
        self
    }

    /// Whether the last heartbeat is no older than `down_time` at `now`.
    pub fn is_up_at(&self, now: u64, down_time: Duration) -> bool {
        now.saturating_sub(self.last_heartbeat) <= down_time.as_secs()
    }

    /// Whether the service is up right now.
    pub fn is_up(&self, down_time: Duration) -> bool {
        self.is_up_at(epoch_secs(), down_time)
    }
}

/// A volume service together with the gigabytes already committed to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeServiceLoad {
    pub service: ServiceRecord,
    pub committed_gb: u64,
}

// ── Capabilities ───────────────────────────────────────────────────

/// Raw capability advertisement for one topic.
///
/// Values are scalars or semi-structured strings such as
/// `{"vendor":"intel","features":["sse","avx"]}`.
pub type CapabilityReport = BTreeMap<String, serde_json::Value>;

/// Everything a host has advertised, keyed by service topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostCapabilities {
    pub host: HostId,
    pub topics: BTreeMap<String, CapabilityReport>,
    /// Unix timestamp of the most recent update.
    pub updated_at: u64,
}

impl HostCapabilities {
    pub fn new(host: impl Into<HostId>) -> Self {
        Self {
            host: host.into(),
            topics: BTreeMap::new(),
            updated_at: 0,
        }
    }

    /// The sub-report advertised for `topic`, if any.
    pub fn for_topic(&self, topic: &str) -> Option<&CapabilityReport> {
        self.topics.get(topic)
    }
}

// ── Request context ────────────────────────────────────────────────

/// Authorization context of the caller issuing a placement request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            project_id: Some(project_id.into()),
            is_admin: false,
        }
    }

    /// An administrative context with no user or project.
    pub fn admin() -> Self {
        Self {
            user_id: None,
            project_id: None,
            is_admin: true,
        }
    }

    /// Copy of this context with admin rights.
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            ..self.clone()
        }
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_value_deserializes_untagged() {
        let specs: BTreeMap<String, SpecValue> = serde_json::from_str(
            r#"{"cpu_arch":"s== x86_64","gpus":2,"ratio":1.5,"hvm":true}"#,
        )
        .unwrap();

        assert_eq!(specs["cpu_arch"], SpecValue::Text("s== x86_64".into()));
        assert_eq!(specs["gpus"], SpecValue::Integer(2));
        assert_eq!(specs["ratio"], SpecValue::Float(1.5));
        assert_eq!(specs["hvm"], SpecValue::Bool(true));
    }

    #[test]
    fn profile_accepts_local_gb_alias() {
        let profile: ResourceProfile = serde_json::from_str(
            r#"{"id":1,"flavorid":1,"name":"m1.tiny","vcpus":1,"memory_mb":512,"local_gb":0}"#,
        )
        .unwrap();
        assert_eq!(profile.root_gb, 0);
        assert!(profile.extra_specs.is_empty());
    }

    #[test]
    fn service_liveness_uses_heartbeat_age() {
        let mut svc = ServiceRecord::new("host-a", COMPUTE_TOPIC);
        svc.last_heartbeat = 1_000;
        let down_time = Duration::from_secs(60);

        assert!(svc.is_up_at(1_060, down_time));
        assert!(!svc.is_up_at(1_061, down_time));
        // Clock skew never marks a service down.
        assert!(svc.is_up_at(900, down_time));
    }

    #[test]
    fn elevated_context_keeps_identity() {
        let ctx = RequestContext::new("alice", "proj");
        let admin = ctx.elevated();
        assert!(admin.is_admin);
        assert_eq!(admin.user_id.as_deref(), Some("alice"));
        assert!(!ctx.is_admin);
    }
}
