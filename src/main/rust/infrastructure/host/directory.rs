use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::services::BridgeController;

/// Bridges known to the host, by node id
#[derive(Clone, Default)]
pub struct BridgeDirectory {
    bridges: Arc<RwLock<BTreeMap<String, Arc<BridgeController>>>>,
}

impl BridgeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bridge: Arc<BridgeController>) {
        self.bridges.write().insert(bridge.id().to_string(), bridge);
    }

    pub fn get(&self, id: &str) -> Option<Arc<BridgeController>> {
        self.bridges.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<BridgeController>> {
        self.bridges.write().remove(id)
    }

    pub fn all(&self) -> Vec<Arc<BridgeController>> {
        self.bridges.read().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.read().is_empty()
    }
}
