use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use crate::application::services::fault_interceptor::{parse_fault, FaultInterceptor};
use crate::application::services::{DeviceRegistry, RegistrationOutcome};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    BridgedDevice, EngineFaultReport, Hub, MetricsReporter, PairingCodes, ProtocolEngine,
};
use crate::domain::value_objects::{
    BridgeConfig, BridgeState, NodeStatus, RegistrationState, SettlePolicy,
};

/// Commissioning status as exposed to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CommissioningInfo {
    Ready(PairingCodes),
    Commissioned,
}

/// Owns the shared hub, its device registry and the engine fault interceptor
pub struct BridgeController {
    config: BridgeConfig,
    engine: Arc<dyn ProtocolEngine>,
    settle: SettlePolicy,
    metrics: Arc<dyn MetricsReporter>,
    state: RwLock<BridgeState>,
    hub: RwLock<Option<Arc<dyn Hub>>>,
    registry: DeviceRegistry,
    interceptor: FaultInterceptor,
    starting: AtomicBool,
    closed: AtomicBool,
    online_since: RwLock<Option<SystemTime>>,
    self_ref: Weak<BridgeController>,
}

impl BridgeController {
    /// Create the controller and attach its fault interceptor
    pub fn new(
        config: BridgeConfig,
        engine: Arc<dyn ProtocolEngine>,
        settle: SettlePolicy,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Arc<Self> {
        tracing::info!(bridge = %config.id(), "Loading bridge");
        let faults = engine.subscribe_faults();
        Arc::new_cyclic(|self_ref| Self {
            interceptor: FaultInterceptor::install(faults, self_ref.clone()),
            config,
            engine,
            settle,
            metrics,
            state: RwLock::new(BridgeState::Uninitialized),
            hub: RwLock::new(None),
            registry: DeviceRegistry::new(),
            starting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            online_since: RwLock::new(None),
            self_ref: self_ref.clone(),
        })
    }

    pub fn id(&self) -> &str {
        self.config.id()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        *self.state.read()
    }

    /// True once a hub instance exists
    pub fn has_hub(&self) -> bool {
        self.state().has_hub() && self.hub.read().is_some()
    }

    pub fn hub(&self) -> Option<Arc<dyn Hub>> {
        self.hub.read().clone()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn online_since(&self) -> Option<SystemTime> {
        *self.online_since.read()
    }

    pub fn is_intercepting_faults(&self) -> bool {
        self.interceptor.is_installed()
    }

    fn set_state(&self, state: BridgeState) {
        *self.state.write() = state;
        self.metrics.report_bridge_state(self.config.id(), state);
    }

    /// Configure the engine environment and build the hub
    pub async fn create(&self) -> Result<()> {
        if self.state() != BridgeState::Uninitialized || self.closed.load(Ordering::SeqCst) {
            tracing::warn!(bridge = %self.id(), state = %self.state(), "Bridge already created");
            return Ok(());
        }
        self.set_state(BridgeState::Creating);

        let storage = self.config.storage_location().map(|p| p.as_path());
        if let Some(location) = storage {
            tracing::info!(bridge = %self.id(), "Using custom storage: {}", location.display());
        }
        let created = match self
            .engine
            .configure_environment(self.config.network_interface(), storage)
        {
            Ok(()) => self.engine.create_hub(&self.config).await,
            Err(e) => Err(e),
        };

        match created {
            Ok(hub) => {
                *self.hub.write() = Some(hub);
                self.set_state(BridgeState::Ready);
                tracing::info!(bridge = %self.id(), port = self.config.port(), "Bridge created");
                self.start_when_resolved();
                Ok(())
            }
            Err(e) => {
                tracing::error!(bridge = %self.id(), error = %e, "Failed to create hub");
                self.set_state(BridgeState::Uninitialized);
                Err(e)
            }
        }
    }

    /// Start the hub, or re-broadcast readiness when already online
    pub async fn start(&self) -> Result<()> {
        match self.state() {
            BridgeState::Ready => self.start_hub().await,
            BridgeState::Online => {
                let hub = self.hub().ok_or(DomainError::NoBridge)?;
                hub.settled(self.settle.hub_settle()).await;
                self.notify_devices_ready();
                Ok(())
            }
            state => {
                tracing::warn!(bridge = %self.id(), state = %state, "Bridge cannot start yet");
                Ok(())
            }
        }
    }

    async fn start_hub(&self) -> Result<()> {
        if self.starting.swap(true, Ordering::SeqCst) {
            tracing::debug!(bridge = %self.id(), "Hub start already in progress");
            return Ok(());
        }
        let Some(hub) = self.hub() else {
            self.starting.store(false, Ordering::SeqCst);
            return Err(DomainError::NoBridge);
        };

        tracing::info!(bridge = %self.id(), "Starting hub...");
        if let Err(e) = hub.start().await {
            tracing::error!(bridge = %self.id(), error = %e, "Failed to start hub");
            self.starting.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.set_state(BridgeState::Online);
        *self.online_since.write() = Some(SystemTime::now());
        tracing::info!(bridge = %self.id(), "Hub started");

        hub.settled(self.settle.hub_settle()).await;
        self.starting.store(false, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.notify_devices_ready();
        Ok(())
    }

    /// Send the readiness signal to every registered device not yet notified
    pub fn notify_devices_ready(&self) -> usize {
        if !self.state().is_online() {
            tracing::warn!(bridge = %self.id(), "Hub not online, readiness not broadcast");
            return 0;
        }
        let devices = self.registry.prepare_broadcast();
        for device in &devices {
            device.on_server_ready();
        }
        tracing::debug!(bridge = %self.id(), notified = devices.len(), "Readiness broadcast");
        devices.len()
    }

    fn start_when_resolved(&self) {
        if !self.registry.all_pending_resolved() || !self.has_hub() {
            return;
        }
        let Some(bridge) = self.self_ref.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(bridge = %self.id(), "No async runtime, hub not started");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = bridge.start().await {
                tracing::error!(bridge = %bridge.id(), error = %e, "Bridge start failed");
            }
        });
    }

    /// Declare a device this bridge waits for before starting
    pub fn expect_device(&self, node_id: impl Into<String>) {
        self.registry.expect(node_id);
    }

    /// Register a device and add it to the hub aggregate
    pub fn register(&self, device: Arc<dyn BridgedDevice>) -> RegistrationOutcome {
        tracing::info!(bridge = %self.id(), device = %device.node_id(), "Registering device");
        let Some(hub) = self.hub() else {
            self.registry.remove_failed(device.node_id());
            return RegistrationOutcome::AddFailed(DomainError::BridgeNotReady(self.id().to_string()));
        };
        let outcome = self.registry.register(&device, &hub);
        self.start_when_resolved();
        outcome
    }

    /// A device that will never register stops blocking the start
    pub fn resolve_failed(&self, node_id: &str) {
        self.registry.remove_failed(node_id);
        self.start_when_resolved();
    }

    /// Forget a device; the last pending one leaving may unblock the start
    pub fn unregister(&self, node_id: &str) -> bool {
        let removed = self.registry.remove(node_id);
        self.start_when_resolved();
        removed
    }

    /// Drop pending devices that belong to disabled flows
    pub fn prune_disabled(&self, disabled: &HashSet<String>) -> usize {
        let pruned = self.registry.prune_disabled(disabled);
        if pruned > 0 {
            self.start_when_resolved();
        }
        pruned
    }

    /// Translate an engine fault into a failure of the device it names
    pub async fn handle_engine_fault(&self, report: &EngineFaultReport) {
        let Some(fault) = parse_fault(&report.message) else {
            tracing::trace!(bridge = %self.id(), "Ignoring unrelated engine fault");
            self.metrics.report_engine_fault(false);
            return;
        };
        let Some(hub) = self.hub() else {
            self.metrics.report_engine_fault(false);
            return;
        };
        if fault.hub_id != hub.id() {
            tracing::trace!(bridge = %self.id(), hub = %fault.hub_id, "Fault belongs to another hub");
            return;
        }
        let Some(device) = self.registry.find_by_protocol_id(&fault.protocol_id) else {
            tracing::debug!(bridge = %self.id(), device = %fault.protocol_id, "Fault for unknown device");
            self.metrics.report_engine_fault(false);
            return;
        };

        tracing::error!(
            bridge = %self.id(),
            device = %device.node_id(),
            reason = %fault.reason,
            "Device validation error"
        );
        self.metrics.report_engine_fault(true);
        self.registry
            .mark_failed(device.node_id(), RegistrationState::ValidationFailed);
        device.on_failure(
            DomainError::EngineFault {
                device: fault.protocol_id.clone(),
                reason: fault.reason,
            },
            NodeStatus::validation_error(),
        );

        if hub.aggregate_contains(&fault.protocol_id) {
            if let Err(e) = hub.remove_from_aggregate(&fault.protocol_id).await {
                tracing::debug!(device = %fault.protocol_id, error = %e, "Aggregate cleanup failed");
            }
        }
    }

    /// Pairing codes while uncommissioned, `None` without a hub
    pub fn commissioning(&self) -> Option<CommissioningInfo> {
        let hub = self.hub()?;
        Some(if hub.is_commissioned() {
            CommissioningInfo::Commissioned
        } else {
            CommissioningInfo::Ready(hub.pairing_codes())
        })
    }

    /// Allow basic commissioning again and return fresh pairing codes
    pub async fn reopen_commissioning(&self) -> Result<PairingCodes> {
        let hub = self.hub().ok_or(DomainError::NoBridge)?;
        hub.reopen_commissioning().await?;
        tracing::info!(bridge = %self.id(), "Commissioning window reopened");
        Ok(hub.pairing_codes())
    }

    /// Stop intercepting faults and close the hub
    pub async fn close(&self, removed: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.interceptor.uninstall();
        let hub = self.hub.write().take();
        if let Some(hub) = hub {
            tracing::info!(
                bridge = %self.id(),
                "{}",
                if removed { "Bridge removed" } else { "Bridge restarted" }
            );
            hub.close().await?;
        }
        self.set_state(BridgeState::Uninitialized);
        Ok(())
    }
}
