/// A device type known to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTypeDescriptor {
    pub name: String,
    pub code: u32,
    /// Behaviors every endpoint of this type must carry
    pub mandatory_behaviors: Vec<String>,
}

/// A server behavior known to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorDescriptor {
    pub name: String,
    /// Key of the behavior in the device's live state
    pub state_key: String,
    pub features: Vec<String>,
}

impl BehaviorDescriptor {
    pub fn supports_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Read-only catalog of device types and behaviors
pub trait DeviceCatalog: Send + Sync {
    fn device_type(&self, name: &str) -> Option<DeviceTypeDescriptor>;
    fn behavior(&self, name: &str) -> Option<BehaviorDescriptor>;
}
