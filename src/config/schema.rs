//! Configuration schema
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) describes the stock rig.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::signal::catalog::{Phase, PhaseCatalog};
use crate::signal::executor::SignalTiming;
use crate::signal::hardware::DEFAULT_RECONNECT_INTERVAL;
use crate::signal::lane::HeadMap;
use crate::signal::priority::GreenTimePolicy;

/// Stock wiring string for [`HardwareConfig::head_map`].
pub const DEFAULT_HEAD_MAP: &str = "ABEDCF";

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    /// Sequence timing.
    pub timing: SignalTiming,
    /// Green time policy and fairness bound.
    pub policy: GreenTimePolicy,
    /// Signal head connection.
    pub hardware: HardwareConfig,
    /// Cycle record sink.
    pub persistence: PersistenceConfig,
    /// Replacement phase catalog; the stock catalog when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<Phase>>,
}

impl RigConfig {
    /// Builds the phase catalog this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] of a configured catalog.
    pub fn build_catalog(&self) -> Result<PhaseCatalog, CatalogError> {
        self.catalog
            .clone()
            .map_or_else(|| Ok(PhaseCatalog::standard()), PhaseCatalog::new)
    }
}

/// Signal head connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    /// `host:port` of the rig's line link; simulated heads when absent.
    pub link: Option<String>,
    /// Bound on opening the link.
    #[serde(with = "super::duration")]
    pub connect_timeout: Duration,
    /// Wait for an acknowledgement line after each command.
    #[serde(with = "super::duration::option")]
    pub ack_timeout: Option<Duration>,
    /// Physical head letter per lane, e.g. `ABEDCF`.
    pub head_map: String,
    /// Gap between reconnect attempts while the link is down.
    #[serde(with = "super::duration")]
    pub reconnect_interval: Duration,
}

impl HardwareConfig {
    /// Parses [`Self::head_map`].
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed mapping.
    pub fn parsed_head_map(&self) -> Result<HeadMap, String> {
        self.head_map.parse()
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            link: None,
            connect_timeout: Duration::from_secs(2),
            ack_timeout: None,
            head_map: DEFAULT_HEAD_MAP.to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

/// Cycle record sink settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    /// JSONL file receiving one line per completed cycle.
    pub cycle_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_stock_rig() {
        let config: RigConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RigConfig::default());
        assert_eq!(config.policy.max_green, 45);
        assert_eq!(config.timing.yellow, Duration::from_secs(3));
        assert_eq!(config.hardware.head_map, "ABEDCF");
        assert_eq!(config.build_catalog().unwrap(), PhaseCatalog::standard());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let yaml = "policy:\n  max_green: 30\nhardware:\n  link: 10.0.0.5:7000\n  ack_timeout: 150ms\n";
        let config: RigConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.policy.max_green, 30);
        assert_eq!(config.policy.min_green, 5);
        assert_eq!(config.hardware.link.as_deref(), Some("10.0.0.5:7000"));
        assert_eq!(config.hardware.ack_timeout, Some(Duration::from_millis(150)));
        assert_eq!(config.hardware.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.hardware.reconnect_interval, Duration::from_secs(5));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<RigConfig>("policy:\n  max_gren: 30\n").is_err());
        assert!(serde_yaml::from_str::<RigConfig>("timings: {}\n").is_err());
    }

    #[test]
    fn configured_catalog_is_validated() {
        let yaml = "catalog:\n  - id: 1\n    name: ONLY\n    lanes: [0]\n    group: AVENUE\n";
        let config: RigConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.build_catalog(),
            Err(CatalogError::GroupPairing { found: 1, .. })
        ));
    }
}
