use serde_json::{Map, Value};

use crate::domain::errors::DomainError;
use crate::domain::value_objects::DeviceIdentity;

/// One server behavior attached to a device, with its enabled features
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorSpec {
    pub name: String,
    pub state_key: String,
    pub features: Vec<String>,
}

/// Everything the engine needs to construct a device handle
#[derive(Debug, Clone)]
pub struct DeviceBlueprint {
    pub identity: DeviceIdentity,
    pub device_type: String,
    pub behaviors: Vec<BehaviorSpec>,
    pub endpoint: Map<String, Value>,
    /// Unknown behaviors and features left out of the blueprint
    pub dropped: Vec<DomainError>,
}

impl DeviceBlueprint {
    pub fn behavior(&self, name: &str) -> Option<&BehaviorSpec> {
        self.behaviors.iter().find(|b| b.name == name)
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.behavior(name).is_some()
    }
}
