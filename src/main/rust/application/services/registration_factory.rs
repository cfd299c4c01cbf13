use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    CommandSink, DeviceCatalog, DeviceHandle, DeviceTypeDescriptor, ProtocolEngine,
};
use crate::domain::value_objects::{BehaviorSpec, DeviceBlueprint, DeviceConfig, DeviceIdentity};

/// Behaviors every bridged endpoint carries
const BASELINE_BEHAVIORS: [&str; 2] = ["BridgedDeviceBasicInformation", "Identify"];

const BASIC_INFORMATION_KEY: &str = "bridgedDeviceBasicInformation";

/// A constructed device plus the entries left out of it
pub struct BuiltDevice {
    pub handle: Arc<dyn DeviceHandle>,
    pub dropped: Vec<DomainError>,
}

/// Translates declarative device configuration into engine constructs
pub struct DeviceRegistrationFactory {
    engine: Arc<dyn ProtocolEngine>,
    catalog: Arc<dyn DeviceCatalog>,
}

impl DeviceRegistrationFactory {
    pub fn new(engine: Arc<dyn ProtocolEngine>) -> Self {
        let catalog = engine.catalog();
        Self { engine, catalog }
    }

    /// Compute the full device description without touching the engine
    pub fn blueprint(&self, identity: &DeviceIdentity, config: &DeviceConfig) -> Result<DeviceBlueprint> {
        let device_type = self
            .resolve_device_type(config.device_type())
            .ok_or_else(|| DomainError::UnknownDeviceType(config.device_type().to_string()))?;

        let mut behaviors: Vec<BehaviorSpec> = Vec::new();
        let mut dropped = Vec::new();

        for name in &device_type.mandatory_behaviors {
            match self.behavior_spec(name, config, &mut dropped) {
                Some(spec) => upsert(&mut behaviors, spec),
                None => dropped.push(DomainError::UnknownBehavior(name.clone())),
            }
        }

        for name in BASELINE_BEHAVIORS {
            if let Some(spec) = self.behavior_spec(name, config, &mut dropped) {
                upsert(&mut behaviors, spec);
            }
        }

        for name in config.additional_behaviors() {
            match self.behavior_spec(name, config, &mut dropped) {
                Some(spec) => upsert(&mut behaviors, spec),
                None => dropped.push(DomainError::UnknownBehavior(name.clone())),
            }
        }

        Ok(DeviceBlueprint {
            identity: identity.clone(),
            device_type: device_type.name,
            behaviors,
            endpoint: endpoint_config(identity, config.initial_state()),
            dropped,
        })
    }

    /// Build the engine handle; registration stays with the caller
    pub async fn build(
        &self,
        identity: &DeviceIdentity,
        config: &DeviceConfig,
        commands: Arc<dyn CommandSink>,
    ) -> Result<BuiltDevice> {
        let blueprint = self.blueprint(identity, config)?;
        let handle = self.engine.construct_device(&blueprint, commands).await?;
        Ok(BuiltDevice {
            handle,
            dropped: blueprint.dropped,
        })
    }

    fn resolve_device_type(&self, name: &str) -> Option<DeviceTypeDescriptor> {
        self.catalog.device_type(name).or_else(|| {
            name.strip_suffix("Device")
                .and_then(|base| self.catalog.device_type(base))
        })
    }

    fn behavior_spec(
        &self,
        name: &str,
        config: &DeviceConfig,
        dropped: &mut Vec<DomainError>,
    ) -> Option<BehaviorSpec> {
        let base = name.strip_suffix("Server").unwrap_or(name);
        let descriptor = self.catalog.behavior(base)?;

        let mut features = Vec::new();
        for feature in config.features_for(&descriptor.name) {
            if descriptor.supports_feature(feature) {
                features.push(feature.clone());
            } else {
                dropped.push(DomainError::UnknownFeature {
                    behavior: descriptor.name.clone(),
                    feature: feature.clone(),
                });
            }
        }

        Some(BehaviorSpec {
            name: descriptor.name,
            state_key: descriptor.state_key,
            features,
        })
    }
}

/// Later declarations of a behavior replace earlier ones in place
fn upsert(behaviors: &mut Vec<BehaviorSpec>, spec: BehaviorSpec) {
    match behaviors.iter_mut().find(|b| b.name == spec.name) {
        Some(existing) => *existing = spec,
        None => behaviors.push(spec),
    }
}

fn endpoint_config(identity: &DeviceIdentity, initial_state: &Map<String, Value>) -> Map<String, Value> {
    let mut endpoint = Map::new();
    endpoint.insert("id".to_string(), json!(identity.protocol_id()));
    endpoint.insert(
        BASIC_INFORMATION_KEY.to_string(),
        json!({
            "nodeLabel": identity.name(),
            "productName": identity.name(),
            "productLabel": identity.name(),
            "serialNumber": identity.protocol_id(),
            "uniqueId": identity.unique_id(),
            "reachable": true,
        }),
    );

    for (key, value) in initial_state {
        endpoint.insert(key.clone(), value.clone());
    }

    // Identity fields always come from the synthesized ids
    endpoint.insert("id".to_string(), json!(identity.protocol_id()));
    let info = endpoint
        .entry(BASIC_INFORMATION_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !info.is_object() {
        *info = Value::Object(Map::new());
    }
    if let Value::Object(info) = info {
        info.insert("serialNumber".to_string(), json!(identity.protocol_id()));
        info.insert("uniqueId".to_string(), json!(identity.unique_id()));
    }
    endpoint
}
