/// Stable identity of a bridged device, derived from its opaque node id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    node_id: String,
    name: String,
    protocol_id: String,
    unique_id: String,
}

impl DeviceIdentity {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let protocol_id = Self::protocol_id_for(&node_id);
        let unique_id = protocol_id.chars().rev().collect();
        Self {
            node_id,
            name: name.into(),
            protocol_id,
            unique_id,
        }
    }

    /// Protocol-safe form of a node id
    pub fn protocol_id_for(node_id: &str) -> String {
        node_id.replace('-', "")
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Display name, falling back to the node id when unnamed
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.node_id
        } else {
            &self.name
        }
    }

    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}
