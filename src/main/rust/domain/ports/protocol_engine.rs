use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::errors::Result;
use crate::domain::ports::{CommandSink, DeviceCatalog, DeviceHandle};
use crate::domain::value_objects::{BridgeConfig, DeviceBlueprint};

/// Asynchronous failure reported by the engine after a call returned
#[derive(Debug, Clone, PartialEq)]
pub struct EngineFaultReport {
    pub message: String,
}

impl EngineFaultReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodes {
    pub qr_pairing_code: String,
    pub manual_pairing_code: String,
}

/// Shared hub with its aggregate of bridged devices
#[async_trait]
pub trait Hub: Send + Sync {
    /// Id used in the hub's endpoint paths
    fn id(&self) -> &str;

    async fn start(&self) -> Result<()>;

    fn is_online(&self) -> bool;

    /// Resolves once post-start validation is done, or after `fallback`
    async fn settled(&self, fallback: Duration);

    fn aggregate_contains(&self, protocol_id: &str) -> bool;

    fn add_to_aggregate(&self, device: Arc<dyn DeviceHandle>) -> Result<()>;

    async fn remove_from_aggregate(&self, protocol_id: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_commissioned(&self) -> bool;

    fn pairing_codes(&self) -> PairingCodes;

    async fn reopen_commissioning(&self) -> Result<()>;
}

/// Port for the device-protocol engine
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    fn catalog(&self) -> Arc<dyn DeviceCatalog>;

    fn configure_environment(
        &self,
        network_interface: Option<&str>,
        storage_location: Option<&Path>,
    ) -> Result<()>;

    async fn create_hub(&self, config: &BridgeConfig) -> Result<Arc<dyn Hub>>;

    async fn construct_device(
        &self,
        blueprint: &DeviceBlueprint,
        commands: Arc<dyn CommandSink>,
    ) -> Result<Arc<dyn DeviceHandle>>;

    /// Channel of unhandled asynchronous failures
    fn subscribe_faults(&self) -> broadcast::Receiver<EngineFaultReport>;
}
