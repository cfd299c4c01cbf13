use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    CommandSink, DeviceCatalog, DeviceHandle, EngineFaultReport, Hub, ProtocolEngine,
};
use crate::domain::value_objects::{BridgeConfig, DeviceBlueprint};
use crate::infrastructure::engine::in_memory_hub::DeviceDirectory;
use crate::infrastructure::engine::{InMemoryDevice, InMemoryHub, StaticCatalog};

const FAULT_CHANNEL_CAPACITY: usize = 64;

/// Environment applied before hubs are created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineEnvironment {
    pub network_interface: Option<String>,
    pub storage_location: Option<PathBuf>,
}

/// Protocol engine that keeps every hub and device in process
pub struct InMemoryEngine {
    catalog: Arc<StaticCatalog>,
    faults: broadcast::Sender<EngineFaultReport>,
    directory: DeviceDirectory,
    hubs: Mutex<HashMap<String, Arc<InMemoryHub>>>,
    environment: Mutex<EngineEnvironment>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        Self {
            catalog: Arc::new(StaticCatalog::standard()),
            faults,
            directory: Arc::new(Mutex::new(HashMap::new())),
            hubs: Mutex::new(HashMap::new()),
            environment: Mutex::new(EngineEnvironment::default()),
        }
    }

    pub fn environment(&self) -> EngineEnvironment {
        self.environment.lock().clone()
    }

    /// Device most recently constructed under this protocol id
    pub fn device(&self, protocol_id: &str) -> Option<Arc<InMemoryDevice>> {
        self.directory.lock().get(protocol_id).and_then(Weak::upgrade)
    }

    /// Hub created for a bridge serial number
    pub fn hub(&self, hub_id: &str) -> Option<Arc<InMemoryHub>> {
        self.hubs.lock().get(hub_id).cloned()
    }

    /// Publish an arbitrary message on the fault channel
    pub fn inject_fault(&self, message: impl Into<String>) -> usize {
        self.faults
            .send(EngineFaultReport::new(message))
            .unwrap_or(0)
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolEngine for InMemoryEngine {
    fn catalog(&self) -> Arc<dyn DeviceCatalog> {
        self.catalog.clone()
    }

    fn configure_environment(
        &self,
        network_interface: Option<&str>,
        storage_location: Option<&Path>,
    ) -> Result<()> {
        if let Some(location) = storage_location {
            std::fs::create_dir_all(location).map_err(|e| {
                DomainError::HubCreationFailed(format!(
                    "storage location {}: {}",
                    location.display(),
                    e
                ))
            })?;
        }
        *self.environment.lock() = EngineEnvironment {
            network_interface: network_interface.map(str::to_string),
            storage_location: storage_location.map(Path::to_path_buf),
        };
        Ok(())
    }

    async fn create_hub(&self, config: &BridgeConfig) -> Result<Arc<dyn Hub>> {
        let mut hubs = self.hubs.lock();
        if let Some(other) = hubs
            .values()
            .find(|h| !h.is_closed() && h.port() == config.port() && h.id() != config.serial_number())
        {
            return Err(DomainError::HubCreationFailed(format!(
                "port {} already used by hub {}",
                config.port(),
                other.id()
            )));
        }

        let hub = Arc::new(InMemoryHub::new(
            config,
            self.directory.clone(),
            self.faults.clone(),
        ));
        hubs.insert(hub.id().to_string(), hub.clone());
        Ok(hub)
    }

    async fn construct_device(
        &self,
        blueprint: &DeviceBlueprint,
        commands: Arc<dyn CommandSink>,
    ) -> Result<Arc<dyn DeviceHandle>> {
        let device = Arc::new(InMemoryDevice::construct(&self.catalog, blueprint, commands)?);
        self.directory
            .lock()
            .insert(device.protocol_id().to_string(), Arc::downgrade(&device));
        Ok(device)
    }

    fn subscribe_faults(&self) -> broadcast::Receiver<EngineFaultReport> {
        self.faults.subscribe()
    }
}
