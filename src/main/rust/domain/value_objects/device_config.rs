use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::errors::{DomainError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceTypeField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeviceConfig {
    device_type: DeviceTypeField,
    #[serde(default)]
    additional_behaviors: Vec<String>,
    #[serde(default)]
    behavior_features: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    initial_state: Option<Value>,
}

/// Declarative description of one bridged device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    device_type: String,
    secondary_types: Vec<String>,
    additional_behaviors: Vec<String>,
    behavior_features: BTreeMap<String, Vec<String>>,
    initial_state: Map<String, Value>,
}

impl DeviceConfig {
    /// Accepts either a JSON object or a string holding one
    pub fn parse(raw: &Value) -> Result<Self> {
        match raw {
            Value::String(text) => Self::from_json_str(text),
            other => Self::from_value(other.clone()),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DomainError::ConfigError(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let raw: RawDeviceConfig =
            serde_json::from_value(value).map_err(|e| DomainError::ConfigError(e.to_string()))?;

        let mut types = match raw.device_type {
            DeviceTypeField::One(name) => vec![name],
            DeviceTypeField::Many(names) => names,
        };
        if types.is_empty() {
            return Err(DomainError::ConfigError("deviceType list is empty".to_string()));
        }
        let device_type = types.remove(0);
        if device_type.trim().is_empty() {
            return Err(DomainError::ConfigError("deviceType is empty".to_string()));
        }

        let initial_state = match raw.initial_state {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(DomainError::ConfigError(
                    "initialState must be an object".to_string(),
                ))
            }
        };

        let behavior_features = raw
            .behavior_features
            .into_iter()
            .map(|(behavior, features)| (behavior, dedup(features)))
            .collect();

        Ok(Self {
            device_type,
            secondary_types: types,
            additional_behaviors: dedup(raw.additional_behaviors),
            behavior_features,
            initial_state,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Types listed after the primary one; informational only
    pub fn secondary_types(&self) -> &[String] {
        &self.secondary_types
    }

    pub fn additional_behaviors(&self) -> &[String] {
        &self.additional_behaviors
    }

    pub fn features_for(&self, behavior: &str) -> &[String] {
        self.behavior_features
            .get(behavior)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn initial_state(&self) -> &Map<String, Value> {
        &self.initial_state
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_single_type() {
        let config = DeviceConfig::parse(&json!({"deviceType": "OnOffLight"})).unwrap();
        assert_eq!(config.device_type(), "OnOffLight");
        assert!(config.additional_behaviors().is_empty());
        assert!(config.initial_state().is_empty());
    }

    #[test]
    fn test_first_entry_of_list_is_primary() {
        let config =
            DeviceConfig::parse(&json!({"deviceType": ["DimmableLight", "OnOffLight"]})).unwrap();
        assert_eq!(config.device_type(), "DimmableLight");
        assert_eq!(config.secondary_types(), ["OnOffLight".to_string()]);
    }

    #[test]
    fn test_parses_string_payload() {
        let raw = json!("{\"deviceType\":\"ContactSensor\",\"additionalBehaviors\":[\"PowerSource\",\"PowerSource\"]}");
        let config = DeviceConfig::parse(&raw).unwrap();
        assert_eq!(config.device_type(), "ContactSensor");
        assert_eq!(config.additional_behaviors(), ["PowerSource".to_string()]);
    }

    #[test]
    fn test_features_are_looked_up_by_behavior() {
        let config = DeviceConfig::parse(&json!({
            "deviceType": "Thermostat",
            "behaviorFeatures": {"Thermostat": ["Heating", "Cooling", "Heating"]}
        }))
        .unwrap();
        assert_eq!(config.features_for("Thermostat"), ["Heating", "Cooling"]);
        assert!(config.features_for("OnOff").is_empty());
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            DeviceConfig::parse(&json!("{not json")),
            Err(DomainError::ConfigError(_))
        ));
        assert!(DeviceConfig::parse(&json!({"deviceType": []})).is_err());
        assert!(DeviceConfig::parse(&json!({})).is_err());
        assert!(DeviceConfig::parse(&json!({"deviceType": "OnOffLight", "initialState": 3})).is_err());
    }
}
