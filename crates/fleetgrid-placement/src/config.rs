//! Scheduler configuration.
//!
//! Read once at startup (typically from a `placement.toml`) and handed to
//! the policies at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityMode;
use crate::error::{PlacementError, PlacementResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Maximum number of instance cores per host.
    pub max_cores: u32,
    /// Maximum number of volume gigabytes per host.
    pub max_gigabytes: u64,
    /// Maximum number of networks per host.
    pub max_networks: u32,
    /// Allow overcommitting vcpus past `max_cores`.
    pub skip_isolated_core_check: bool,
    /// Heartbeat age after which a service counts as down.
    pub service_down_time_secs: u64,
    /// How semi-structured capability strings are flattened.
    pub capability_mode: CapabilityMode,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            max_cores: 16,
            max_gigabytes: 10_000,
            max_networks: 1_000,
            skip_isolated_core_check: true,
            service_down_time_secs: 60,
            capability_mode: CapabilityMode::Legacy,
        }
    }
}

impl PlacementConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: PlacementConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject ceilings that would make every placement fail.
    pub fn validate(&self) -> PlacementResult<()> {
        if self.max_cores == 0 {
            return Err(PlacementError::InvalidConfig("max_cores must be positive".into()));
        }
        if self.max_gigabytes == 0 {
            return Err(PlacementError::InvalidConfig(
                "max_gigabytes must be positive".into(),
            ));
        }
        if self.max_networks == 0 {
            return Err(PlacementError::InvalidConfig(
                "max_networks must be positive".into(),
            ));
        }
        if self.service_down_time_secs == 0 {
            return Err(PlacementError::InvalidConfig(
                "service_down_time_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn service_down_time(&self) -> Duration {
        Duration::from_secs(self.service_down_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_legacy_flags() {
        let config = PlacementConfig::default();
        assert_eq!(config.max_cores, 16);
        assert_eq!(config.max_gigabytes, 10_000);
        assert_eq!(config.max_networks, 1_000);
        assert!(config.skip_isolated_core_check);
        assert_eq!(config.capability_mode, CapabilityMode::Legacy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PlacementConfig::from_toml_str(
            r#"
max_gigabytes = 100
capability_mode = "nested"
"#,
        )
        .unwrap();
        assert_eq!(config.max_gigabytes, 100);
        assert_eq!(config.capability_mode, CapabilityMode::Nested);
        assert_eq!(config.max_cores, 16);
    }

    #[test]
    fn zero_quota_is_rejected() {
        let err = PlacementConfig::from_toml_str("max_gigabytes = 0").unwrap_err();
        assert!(err.to_string().contains("max_gigabytes"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_cores = 32\nskip_isolated_core_check = false").unwrap();

        let config = PlacementConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_cores, 32);
        assert!(!config.skip_isolated_core_check);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(PlacementConfig::from_file(Path::new("/nonexistent/placement.toml")).is_err());
    }
}
