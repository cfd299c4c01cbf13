use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::domain::ports::{BehaviorDescriptor, DeviceCatalog, DeviceTypeDescriptor};

#[derive(Debug, Clone)]
pub struct AttributeDef {
    pub name: String,
    pub default: Value,
    pub observable: bool,
    /// Feature that must be enabled for the attribute to exist
    pub feature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandDef {
    pub name: String,
    pub implemented: bool,
    pub expects_response: bool,
}

#[derive(Debug, Clone)]
pub struct ClusterDef {
    pub name: String,
    pub state_key: String,
    pub features: Vec<String>,
    pub attributes: Vec<AttributeDef>,
    pub commands: Vec<CommandDef>,
    /// At least one of these features must be enabled
    pub requires_any_feature: Vec<String>,
}

impl ClusterDef {
    fn new(name: &str, state_key: &str) -> Self {
        Self {
            name: name.to_string(),
            state_key: state_key.to_string(),
            features: Vec::new(),
            attributes: Vec::new(),
            commands: Vec::new(),
            requires_any_feature: Vec::new(),
        }
    }

    fn features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    fn requires_any(mut self, features: &[&str]) -> Self {
        self.requires_any_feature = features.iter().map(|f| f.to_string()).collect();
        self
    }

    fn attr(mut self, name: &str, default: Value) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_string(),
            default,
            observable: true,
            feature: None,
        });
        self
    }

    fn fixed(mut self, name: &str, default: Value) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_string(),
            default,
            observable: false,
            feature: None,
        });
        self
    }

    fn gated(mut self, feature: &str, name: &str, default: Value) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_string(),
            default,
            observable: true,
            feature: Some(feature.to_string()),
        });
        self
    }

    fn command(mut self, name: &str, implemented: bool, expects_response: bool) -> Self {
        self.commands.push(CommandDef {
            name: name.to_string(),
            implemented,
            expects_response,
        });
        self
    }

    pub fn command_def(&self, name: &str) -> Option<&CommandDef> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Initial live state for the given feature selection
    pub fn initial_state(&self, enabled: &[String]) -> Map<String, Value> {
        let mut state = Map::new();
        for attr in &self.attributes {
            let present = attr
                .feature
                .as_ref()
                .map_or(true, |f| enabled.iter().any(|e| e == f));
            if present {
                state.insert(attr.name.clone(), attr.default.clone());
            }
        }
        let feature_map: Map<String, Value> = self
            .features
            .iter()
            .map(|f| (lower_camel(f), Value::Bool(enabled.contains(f))))
            .collect();
        state.insert("featureMap".to_string(), Value::Object(feature_map));
        state.insert("clusterRevision".to_string(), json!(1));
        state
    }

    pub fn is_observable(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name == attribute && a.observable)
    }

    /// Reason the feature selection is invalid, if it is
    pub fn constraint_violation(&self, enabled: &[String]) -> Option<String> {
        if self.requires_any_feature.is_empty()
            || self.requires_any_feature.iter().any(|f| enabled.contains(f))
        {
            return None;
        }
        Some(format!(
            "Missing mandatory attributes: requires one of features {}",
            self.requires_any_feature.join(", ")
        ))
    }
}

#[derive(Debug, Clone)]
struct DeviceTypeDef {
    code: u32,
    mandatory: Vec<String>,
}

/// Built-in catalog of the device types and clusters the reference engine serves
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    clusters: HashMap<String, ClusterDef>,
    device_types: HashMap<String, DeviceTypeDef>,
}

impl StaticCatalog {
    pub fn standard() -> Self {
        let clusters = standard_clusters()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let device_types = [
            ("OnOffLight", 0x0100, &["OnOff", "Groups"][..]),
            ("DimmableLight", 0x0101, &["OnOff", "LevelControl", "Groups"][..]),
            (
                "ColorTemperatureLight",
                0x010C,
                &["OnOff", "LevelControl", "ColorControl", "Groups"][..],
            ),
            (
                "ExtendedColorLight",
                0x010D,
                &["OnOff", "LevelControl", "ColorControl", "Groups"][..],
            ),
            ("OnOffPlugInUnit", 0x010A, &["OnOff", "Groups"][..]),
            ("DimmablePlugInUnit", 0x010B, &["OnOff", "LevelControl", "Groups"][..]),
            ("ContactSensor", 0x0015, &["BooleanState"][..]),
            ("TemperatureSensor", 0x0302, &["TemperatureMeasurement"][..]),
            ("HumiditySensor", 0x0307, &["RelativeHumidityMeasurement"][..]),
            ("OccupancySensor", 0x0107, &["OccupancySensing"][..]),
            ("Thermostat", 0x0301, &["Thermostat"][..]),
            ("DoorLock", 0x000A, &["DoorLock"][..]),
            ("Fan", 0x002B, &["FanControl", "Groups"][..]),
        ]
        .into_iter()
        .map(|(name, code, mandatory)| {
            (
                name.to_string(),
                DeviceTypeDef {
                    code,
                    mandatory: mandatory.iter().map(|m| m.to_string()).collect(),
                },
            )
        })
        .collect();

        Self {
            clusters,
            device_types,
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterDef> {
        self.clusters.get(name)
    }

    pub fn cluster_by_state_key(&self, state_key: &str) -> Option<&ClusterDef> {
        self.clusters.values().find(|c| c.state_key == state_key)
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl DeviceCatalog for StaticCatalog {
    fn device_type(&self, name: &str) -> Option<DeviceTypeDescriptor> {
        self.device_types
            .get(name)
            .map(|def| DeviceTypeDescriptor {
                name: name.to_string(),
                code: def.code,
                mandatory_behaviors: def.mandatory.clone(),
            })
    }

    fn behavior(&self, name: &str) -> Option<BehaviorDescriptor> {
        self.clusters.get(name).map(|c| BehaviorDescriptor {
            name: c.name.clone(),
            state_key: c.state_key.clone(),
            features: c.features.clone(),
        })
    }
}

pub(crate) fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn standard_clusters() -> Vec<ClusterDef> {
    vec![
        ClusterDef::new("Identify", "identify")
            .attr("identifyTime", json!(0))
            .fixed("identifyType", json!(0))
            .command("identify", true, false)
            .command("triggerEffect", true, false),
        ClusterDef::new("BridgedDeviceBasicInformation", "bridgedDeviceBasicInformation")
            .fixed("vendorName", json!(""))
            .fixed("productName", json!(""))
            .attr("nodeLabel", json!(""))
            .fixed("productLabel", json!(""))
            .fixed("serialNumber", json!(""))
            .fixed("uniqueId", json!(""))
            .attr("reachable", json!(true)),
        ClusterDef::new("Groups", "groups")
            .fixed("nameSupport", json!({"nameSupport": true}))
            .command("addGroup", false, true)
            .command("viewGroup", false, true)
            .command("getGroupMembership", false, true)
            .command("removeGroup", false, true)
            .command("removeAllGroups", false, false),
        ClusterDef::new("OnOff", "onOff")
            .features(&["Lighting", "DeadFrontBehavior", "OffOnly"])
            .attr("onOff", json!(false))
            .gated("Lighting", "globalSceneControl", json!(true))
            .gated("Lighting", "onTime", json!(0))
            .gated("Lighting", "offWaitTime", json!(0))
            .gated("Lighting", "startUpOnOff", Value::Null)
            .command("off", true, false)
            .command("on", true, false)
            .command("toggle", true, false)
            .command("offWithEffect", false, false)
            .command("onWithRecallGlobalScene", false, false)
            .command("onWithTimedOff", false, false),
        ClusterDef::new("LevelControl", "levelControl")
            .features(&["OnOff", "Lighting", "Frequency"])
            .attr("currentLevel", json!(0))
            .attr("onLevel", Value::Null)
            .attr("options", json!({}))
            .gated("Lighting", "minLevel", json!(1))
            .fixed("maxLevel", json!(254))
            .gated("Lighting", "remainingTime", json!(0))
            .gated("Lighting", "startUpCurrentLevel", Value::Null)
            .command("moveToLevel", true, false)
            .command("move", false, false)
            .command("step", false, false)
            .command("stop", false, false)
            .command("moveToLevelWithOnOff", true, false)
            .command("moveWithOnOff", false, false)
            .command("stepWithOnOff", false, false)
            .command("stopWithOnOff", false, false),
        ClusterDef::new("ColorControl", "colorControl")
            .features(&["HueSaturation", "EnhancedHue", "ColorLoop", "Xy", "ColorTemperature"])
            .attr("colorMode", json!(2))
            .attr("enhancedColorMode", json!(2))
            .attr("options", json!({}))
            .fixed("numberOfPrimaries", json!(0))
            .gated("HueSaturation", "currentHue", json!(0))
            .gated("HueSaturation", "currentSaturation", json!(0))
            .gated("Xy", "currentX", json!(24939))
            .gated("Xy", "currentY", json!(24701))
            .gated("ColorTemperature", "colorTemperatureMireds", json!(250))
            .gated("ColorTemperature", "colorTempPhysicalMinMireds", json!(153))
            .gated("ColorTemperature", "colorTempPhysicalMaxMireds", json!(500))
            .command("moveToHue", true, false)
            .command("moveToSaturation", true, false)
            .command("moveToHueAndSaturation", true, false)
            .command("moveToColor", true, false)
            .command("moveToColorTemperature", true, false)
            .command("stopMoveStep", false, false),
        ClusterDef::new("BooleanState", "booleanState").attr("stateValue", json!(false)),
        ClusterDef::new("TemperatureMeasurement", "temperatureMeasurement")
            .attr("measuredValue", Value::Null)
            .fixed("minMeasuredValue", Value::Null)
            .fixed("maxMeasuredValue", Value::Null),
        ClusterDef::new("RelativeHumidityMeasurement", "relativeHumidityMeasurement")
            .attr("measuredValue", Value::Null)
            .fixed("minMeasuredValue", Value::Null)
            .fixed("maxMeasuredValue", Value::Null),
        ClusterDef::new("OccupancySensing", "occupancySensing")
            .attr("occupancy", json!({"occupied": false}))
            .fixed("occupancySensorType", json!(0))
            .fixed("occupancySensorTypeBitmap", json!({"pir": true})),
        ClusterDef::new("PowerSource", "powerSource")
            .features(&["Wired", "Battery", "Rechargeable", "Replaceable"])
            .attr("status", json!(0))
            .fixed("order", json!(0))
            .fixed("description", json!(""))
            .gated("Battery", "batChargeLevel", json!(0))
            .gated("Battery", "batPercentRemaining", Value::Null)
            .gated("Battery", "batReplacementNeeded", json!(false))
            .gated("Wired", "wiredCurrentType", json!(0))
            .requires_any(&["Wired", "Battery"]),
        ClusterDef::new("Thermostat", "thermostat")
            .features(&["Heating", "Cooling", "Occupancy", "AutoMode"])
            .attr("localTemperature", Value::Null)
            .attr("systemMode", json!(1))
            .fixed("controlSequenceOfOperation", json!(4))
            .gated("Heating", "occupiedHeatingSetpoint", json!(2000))
            .gated("Cooling", "occupiedCoolingSetpoint", json!(2600))
            .gated("Occupancy", "occupancy", json!({"occupied": true}))
            .command("setpointRaiseLower", false, false)
            .requires_any(&["Heating", "Cooling"]),
        ClusterDef::new("DoorLock", "doorLock")
            .features(&["PinCredential", "User", "DoorPositionSensor"])
            .attr("lockState", json!(1))
            .fixed("lockType", json!(0))
            .attr("actuatorEnabled", json!(true))
            .attr("operatingMode", json!(0))
            .gated("DoorPositionSensor", "doorState", json!(1))
            .command("lockDoor", false, false)
            .command("unlockDoor", false, false)
            .command("unlockWithTimeout", false, false),
        ClusterDef::new("FanControl", "fanControl")
            .features(&["MultiSpeed", "Auto", "Step"])
            .attr("fanMode", json!(0))
            .fixed("fanModeSequence", json!(2))
            .attr("percentSetting", json!(0))
            .attr("percentCurrent", json!(0))
            .gated("MultiSpeed", "speedMax", json!(10))
            .gated("MultiSpeed", "speedSetting", json!(0))
            .command("step", false, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_types_reference_known_clusters() {
        let catalog = StaticCatalog::standard();
        for name in ["OnOffLight", "DimmableLight", "Thermostat", "Fan", "DoorLock"] {
            let device_type = catalog.device_type(name).unwrap();
            for behavior in device_type.mandatory_behaviors {
                assert!(catalog.behavior(&behavior).is_some(), "{}", behavior);
            }
        }
    }

    #[test]
    fn test_feature_gated_attributes() {
        let catalog = StaticCatalog::standard();
        let on_off = catalog.cluster("OnOff").unwrap();
        assert!(!on_off.initial_state(&[]).contains_key("onTime"));
        let lighting = on_off.initial_state(&["Lighting".to_string()]);
        assert!(lighting.contains_key("onTime"));
        assert_eq!(lighting["featureMap"]["lighting"], json!(true));
    }

    #[test]
    fn test_thermostat_requires_heating_or_cooling() {
        let catalog = StaticCatalog::standard();
        let thermostat = catalog.cluster("Thermostat").unwrap();
        assert!(thermostat.constraint_violation(&[]).is_some());
        assert!(thermostat
            .constraint_violation(&["Cooling".to_string()])
            .is_none());
    }

    #[test]
    fn test_revision_and_feature_map_are_not_observable() {
        let catalog = StaticCatalog::standard();
        let on_off = catalog.cluster("OnOff").unwrap();
        assert!(on_off.is_observable("onOff"));
        assert!(!on_off.is_observable("featureMap"));
        assert!(!on_off.is_observable("clusterRevision"));
    }
}
