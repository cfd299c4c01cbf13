use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{DeviceHandle, EngineFaultReport, Hub, PairingCodes};
use crate::domain::value_objects::BridgeConfig;
use crate::infrastructure::engine::pairing::OnboardingPayload;
use crate::infrastructure::engine::InMemoryDevice;

pub(crate) type DeviceDirectory = Arc<Mutex<HashMap<String, Weak<InMemoryDevice>>>>;

/// Hub endpoint with an aggregate of bridged devices
pub struct InMemoryHub {
    id: String,
    port: u16,
    onboarding: OnboardingPayload,
    aggregate: Mutex<Vec<Arc<InMemoryDevice>>>,
    directory: DeviceDirectory,
    faults: broadcast::Sender<EngineFaultReport>,
    online: AtomicBool,
    closed: AtomicBool,
    commissioned: AtomicBool,
    settled_tx: watch::Sender<bool>,
}

impl InMemoryHub {
    pub(crate) fn new(
        config: &BridgeConfig,
        directory: DeviceDirectory,
        faults: broadcast::Sender<EngineFaultReport>,
    ) -> Self {
        let (settled_tx, _) = watch::channel(false);
        Self {
            id: config.serial_number(),
            port: config.port(),
            onboarding: OnboardingPayload {
                vendor_id: config.vendor_id(),
                product_id: config.product_id(),
                discriminator: config.discriminator(),
                passcode: config.passcode(),
            },
            aggregate: Mutex::new(Vec::new()),
            directory,
            faults,
            online: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            commissioned: AtomicBool::new(false),
            settled_tx,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Protocol ids currently in the aggregate, in insertion order
    pub fn aggregate_ids(&self) -> Vec<String> {
        self.aggregate
            .lock()
            .iter()
            .map(|d| d.protocol_id().to_string())
            .collect()
    }

    /// Simulate a controller completing commissioning
    pub fn commission(&self) {
        self.commissioned.store(true, Ordering::SeqCst);
    }

    /// Deferred validation of freshly committed devices; faults surface after the caller resumes
    fn validate_later(&self, devices: Vec<Arc<InMemoryDevice>>, settles_hub: bool) {
        let hub_id = self.id.clone();
        let faults = self.faults.clone();
        let settled_tx = self.settled_tx.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            for device in devices {
                if let Some(reason) = device.validation_error() {
                    device.poison(reason.clone());
                    let message = format!(
                        "Behaviors have errors: Error initializing {}.aggregator.{}: Validating {}",
                        hub_id,
                        device.protocol_id(),
                        reason
                    );
                    tracing::debug!(hub = %hub_id, "{}", message);
                    // No receivers is fine: nobody is intercepting faults
                    let _ = faults.send(EngineFaultReport::new(message));
                }
                device.mark_settled();
            }
            if settles_hub {
                settled_tx.send_replace(true);
            }
        });
    }
}

#[async_trait]
impl Hub for InMemoryHub {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DomainError::HubStartFailed(format!("hub {} is closed", self.id)));
        }
        if self.online.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let devices = self.aggregate.lock().clone();
        tracing::debug!(hub = %self.id, devices = devices.len(), "Hub online");
        self.validate_later(devices, true);
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn settled(&self, fallback: Duration) {
        let mut rx = self.settled_tx.subscribe();
        let wait = async move {
            let _ = rx.wait_for(|settled| *settled).await;
        };
        let _ = tokio::time::timeout(fallback, wait).await;
    }

    fn aggregate_contains(&self, protocol_id: &str) -> bool {
        self.aggregate
            .lock()
            .iter()
            .any(|d| d.protocol_id() == protocol_id)
    }

    fn add_to_aggregate(&self, device: Arc<dyn DeviceHandle>) -> Result<()> {
        let protocol_id = device.protocol_id().to_string();
        let concrete = self
            .directory
            .lock()
            .get(&protocol_id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!(
                    "{} was not constructed by this engine",
                    protocol_id
                ))
            })?;

        {
            let mut aggregate = self.aggregate.lock();
            if aggregate.iter().any(|d| d.protocol_id() == protocol_id) {
                return Err(DomainError::RegistrationConflict(protocol_id));
            }
            concrete.install()?;
            aggregate.push(concrete.clone());
        }

        if self.is_online() {
            self.validate_later(vec![concrete], false);
        }
        Ok(())
    }

    async fn remove_from_aggregate(&self, protocol_id: &str) -> Result<()> {
        let mut aggregate = self.aggregate.lock();
        let before = aggregate.len();
        aggregate.retain(|d| d.protocol_id() != protocol_id);
        if aggregate.len() == before {
            return Err(DomainError::UpdateFailed(format!(
                "{} is not in the aggregate",
                protocol_id
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.online.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_commissioned(&self) -> bool {
        self.commissioned.load(Ordering::SeqCst)
    }

    fn pairing_codes(&self) -> PairingCodes {
        self.onboarding.codes()
    }

    async fn reopen_commissioning(&self) -> Result<()> {
        if !self.is_online() {
            return Err(DomainError::BridgeNotReady(format!(
                "hub {} is not online",
                self.id
            )));
        }
        self.commissioned.store(false, Ordering::SeqCst);
        Ok(())
    }
}
