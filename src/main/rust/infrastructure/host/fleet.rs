use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::{
    BridgeConfig, DeviceNodeConfig, LogLevel, DEFAULT_BRIDGE_NAME, DEFAULT_HUB_PORT,
    DEFAULT_PRODUCT_ID, DEFAULT_PRODUCT_NAME, DEFAULT_VENDOR_ID, DEFAULT_VENDOR_NAME,
};

/// Declaration of one bridge node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeNodeConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u16")]
    pub vendor_id: Option<u16>,
    #[serde(default, deserialize_with = "lenient_u16")]
    pub product_id: Option<u16>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub network_interface: Option<String>,
    #[serde(default)]
    pub storage_location: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient_u16")]
    pub port: Option<u16>,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl BridgeNodeConfig {
    /// Bridge settings with defaults filled in and fresh commissioning secrets
    pub fn to_bridge_config(&self) -> Result<BridgeConfig> {
        let non_empty = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        BridgeConfig::new(self.id.clone())
            .with_name(non_empty(&self.name, DEFAULT_BRIDGE_NAME))
            .with_vendor(
                self.vendor_id.filter(|v| *v != 0).unwrap_or(DEFAULT_VENDOR_ID),
                non_empty(&self.vendor_name, DEFAULT_VENDOR_NAME),
            )
            .with_product(
                self.product_id.filter(|v| *v != 0).unwrap_or(DEFAULT_PRODUCT_ID),
                non_empty(&self.product_name, DEFAULT_PRODUCT_NAME),
            )
            .with_network_interface(self.network_interface.clone())
            .with_storage_location(
                self.storage_location
                    .clone()
                    .filter(|p| !p.as_os_str().is_empty()),
            )
            .with_log_level(self.log_level)
            .with_port(self.port.unwrap_or(DEFAULT_HUB_PORT))
    }
}

/// A flow tab; devices on a disabled tab never register
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowTab {
    pub id: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Everything the host runs: bridges, devices and flow tabs
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Fleet {
    #[serde(default)]
    pub bridges: Vec<BridgeNodeConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceNodeConfig>,
    #[serde(default)]
    pub flows: Vec<FlowTab>,
}

impl Fleet {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::ConfigError(format!("cannot read fleet file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let fleet: Fleet = serde_json::from_str(raw)
            .map_err(|e| DomainError::ConfigError(format!("invalid fleet file: {}", e)))?;
        fleet.check_unique_ids()?;
        Ok(fleet)
    }

    fn check_unique_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let ids = self
            .bridges
            .iter()
            .map(|b| b.id.as_str())
            .chain(self.devices.iter().map(|d| d.id.as_str()));
        for id in ids {
            if !seen.insert(id) {
                return Err(DomainError::ConfigError(format!("duplicate node id {}", id)));
            }
        }
        Ok(())
    }

    /// Devices marked disabled or placed on a disabled flow tab
    pub fn disabled_nodes(&self) -> HashSet<String> {
        let disabled_flows: HashSet<&str> = self
            .flows
            .iter()
            .filter(|f| f.disabled)
            .map(|f| f.id.as_str())
            .collect();
        self.devices
            .iter()
            .filter(|d| {
                d.disabled
                    || d
                        .flow
                        .as_deref()
                        .is_some_and(|flow| disabled_flows.contains(flow))
            })
            .map(|d| d.id.clone())
            .collect()
    }

    /// Every device that names the bridge, disabled ones included
    pub fn devices_for<'a>(&'a self, bridge_id: &'a str) -> impl Iterator<Item = &'a DeviceNodeConfig> {
        self.devices
            .iter()
            .filter(move |d| d.bridge.as_deref() == Some(bridge_id))
    }

    /// Devices the host should actually run
    pub fn enabled_devices(&self) -> Vec<&DeviceNodeConfig> {
        let disabled = self.disabled_nodes();
        self.devices
            .iter()
            .filter(|d| !disabled.contains(&d.id))
            .collect()
    }
}

/// Ids arrive as numbers or numeric strings
fn lenient_u16<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
