use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::ports::{BridgedDevice, Hub};
use crate::domain::value_objects::{NodeStatus, RegistrationState};

/// Result of a registration attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
    AddFailed(DomainError),
}

struct DeviceRecord {
    node_id: String,
    protocol_id: String,
    device: Weak<dyn BridgedDevice>,
    state: RegistrationState,
    notified: bool,
}

/// Read-only view of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub node_id: String,
    pub protocol_id: String,
    pub state: RegistrationState,
    pub notified: bool,
}

#[derive(Default)]
struct RegistryInner {
    pending: Vec<String>,
    records: Vec<DeviceRecord>,
    failed: HashSet<String>,
}

impl RegistryInner {
    fn record_mut(&mut self, node_id: &str) -> Option<&mut DeviceRecord> {
        self.records.iter_mut().find(|r| r.node_id == node_id)
    }

    fn resolve_pending(&mut self, node_id: &str) {
        self.pending.retain(|id| id != node_id);
    }
}

/// Devices attached to one bridge
#[derive(Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a device the bridge must hear from before starting
    pub fn expect(&self, node_id: impl Into<String>) {
        let node_id = node_id.into();
        let mut inner = self.inner.lock();
        let known = inner.pending.contains(&node_id)
            || inner.records.iter().any(|r| r.node_id == node_id);
        if !known {
            inner.pending.push(node_id);
        }
    }

    /// Stop waiting for devices that belong to disabled flows
    pub fn prune_disabled(&self, disabled: &HashSet<String>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.pending.len();
        inner.pending.retain(|id| !disabled.contains(id));
        let pruned = before - inner.pending.len();
        if pruned > 0 {
            info!(pruned, remaining = inner.pending.len(), "Pruned devices of disabled flows");
        }
        pruned
    }

    /// Record the device and add its handle to the hub aggregate exactly once
    pub fn register(&self, device: &Arc<dyn BridgedDevice>, hub: &Arc<dyn Hub>) -> RegistrationOutcome {
        let node_id = device.node_id().to_string();
        let protocol_id = device.protocol_id().to_string();
        {
            let mut inner = self.inner.lock();
            if inner.records.iter().any(|r| r.node_id == node_id) {
                warn!(device = %node_id, "Device already registered, skipping");
                return RegistrationOutcome::AlreadyRegistered;
            }
            inner.resolve_pending(&node_id);
            inner.records.push(DeviceRecord {
                node_id: node_id.clone(),
                protocol_id: protocol_id.clone(),
                device: Arc::downgrade(device),
                state: RegistrationState::Pending,
                notified: false,
            });
        }

        let result = match device.handle() {
            None => Err(DomainError::DeviceNotInitialized(format!(
                "{} has no device handle",
                node_id
            ))),
            Some(_) if hub.aggregate_contains(&protocol_id) => {
                warn!(device = %node_id, protocol_id = %protocol_id, "Aggregate already holds this id");
                Err(DomainError::RegistrationConflict(protocol_id.clone()))
            }
            Some(handle) => hub.add_to_aggregate(handle),
        };

        let mut inner = self.inner.lock();
        match result {
            Ok(()) => {
                if let Some(record) = inner.record_mut(&node_id) {
                    record.state = RegistrationState::Registered;
                }
                info!(device = %node_id, protocol_id = %protocol_id, "Added device to aggregate");
                RegistrationOutcome::Registered
            }
            Err(e) => {
                if let Some(record) = inner.record_mut(&node_id) {
                    record.state = RegistrationState::AddFailed;
                }
                inner.failed.insert(node_id.clone());
                error!(device = %node_id, error = %e, "Failed to add device");
                RegistrationOutcome::AddFailed(e)
            }
        }
    }

    /// Resolve the pending slot of a device that will never register
    pub fn remove_failed(&self, node_id: &str) {
        let mut inner = self.inner.lock();
        inner.resolve_pending(node_id);
        inner.failed.insert(node_id.to_string());
    }

    /// Mark a registered device as permanently failed
    pub fn mark_failed(&self, node_id: &str, state: RegistrationState) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.record_mut(node_id) {
            record.state = state;
        }
        inner.failed.insert(node_id.to_string());
    }

    /// Forget a device entirely
    pub fn remove(&self, node_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.node_id != node_id);
        inner.resolve_pending(node_id);
        inner.failed.remove(node_id);
        before != inner.records.len()
    }

    pub fn find_by_protocol_id(&self, protocol_id: &str) -> Option<Arc<dyn BridgedDevice>> {
        self.inner
            .lock()
            .records
            .iter()
            .find(|r| r.protocol_id == protocol_id)
            .and_then(|r| r.device.upgrade())
    }

    pub fn all_pending_resolved(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    pub fn pending(&self) -> Vec<String> {
        self.inner.lock().pending.clone()
    }

    pub fn is_failed(&self, node_id: &str) -> bool {
        self.inner.lock().failed.contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> Vec<RecordSummary> {
        self.inner
            .lock()
            .records
            .iter()
            .map(|r| RecordSummary {
                node_id: r.node_id.clone(),
                protocol_id: r.protocol_id.clone(),
                state: r.state,
                notified: r.notified,
            })
            .collect()
    }

    /// Devices that should receive the readiness signal now.
    ///
    /// Each candidate is claimed once. Its live state is then read again;
    /// devices failing that check are marked failed instead of being returned.
    pub fn prepare_broadcast(&self) -> Vec<Arc<dyn BridgedDevice>> {
        // Claimed under one lock so concurrent broadcasts never share a device
        let candidates: Vec<(String, Arc<dyn BridgedDevice>)> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let failed = &inner.failed;
            inner
                .records
                .iter_mut()
                .filter(|r| {
                    r.state == RegistrationState::Registered
                        && !r.notified
                        && !failed.contains(&r.node_id)
                })
                .filter_map(|r| {
                    let device = r.device.upgrade()?;
                    r.notified = true;
                    Some((r.node_id.clone(), device))
                })
                .collect()
        };

        let mut ready = Vec::with_capacity(candidates.len());
        for (node_id, device) in candidates {
            if device.is_init_failed() {
                debug!(device = %node_id, "Skipping failed device");
                continue;
            }
            let check = match device.handle() {
                None => Err((
                    DomainError::DeviceNotInitialized("device not properly initialized".into()),
                    NodeStatus::init_failed(),
                )),
                Some(handle) => handle.state_snapshot().map(|_| ()).map_err(|e| {
                    (
                        DomainError::ValidationFailed(format!("device validation check failed: {}", e)),
                        NodeStatus::validation_failed(),
                    )
                }),
            };

            match check {
                Ok(()) => ready.push(device),
                Err((error, status)) => {
                    self.mark_failed(&node_id, RegistrationState::ValidationFailed);
                    device.on_failure(error, status);
                }
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::DeviceRegistrationFactory;
    use crate::domain::ports::{CommandInvocation, CommandSink, DeviceHandle, ProtocolEngine};
    use crate::domain::value_objects::{BridgeConfig, DeviceConfig, DeviceIdentity};
    use crate::infrastructure::engine::InMemoryEngine;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeDevice {
        node_id: String,
        protocol_id: String,
        handle: Option<Arc<dyn DeviceHandle>>,
        failed: AtomicBool,
        ready_signals: AtomicUsize,
        failures: parking_lot::Mutex<Vec<(DomainError, NodeStatus)>>,
    }

    impl FakeDevice {
        fn new(node_id: &str) -> Arc<Self> {
            Self::with_handle(node_id, None)
        }

        fn with_handle(node_id: &str, handle: Option<Arc<dyn DeviceHandle>>) -> Arc<Self> {
            Arc::new(Self {
                node_id: node_id.to_string(),
                protocol_id: node_id.replace('-', ""),
                handle,
                failed: AtomicBool::new(false),
                ready_signals: AtomicUsize::new(0),
                failures: parking_lot::Mutex::new(Vec::new()),
            })
        }
    }

    struct IgnoreCommands;

    impl CommandSink for IgnoreCommands {
        fn on_command(&self, _invocation: &CommandInvocation) {}
    }

    async fn light_handle(engine: &Arc<InMemoryEngine>, node_id: &str) -> Arc<dyn DeviceHandle> {
        let factory = DeviceRegistrationFactory::new(engine.clone());
        let config = DeviceConfig::parse(&serde_json::json!({"deviceType": "OnOffLight"})).unwrap();
        factory
            .build(&DeviceIdentity::new(node_id, node_id), &config, Arc::new(IgnoreCommands))
            .await
            .unwrap()
            .handle
    }

    impl BridgedDevice for FakeDevice {
        fn node_id(&self) -> &str {
            &self.node_id
        }

        fn protocol_id(&self) -> &str {
            &self.protocol_id
        }

        fn handle(&self) -> Option<Arc<dyn DeviceHandle>> {
            self.handle.clone()
        }

        fn is_init_failed(&self) -> bool {
            self.failed.load(Ordering::SeqCst)
        }

        fn on_failure(&self, error: DomainError, status: NodeStatus) {
            self.failed.store(true, Ordering::SeqCst);
            self.failures.lock().push((error, status));
        }

        fn on_server_ready(&self) {
            self.ready_signals.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn hub() -> Arc<dyn Hub> {
        InMemoryEngine::new()
            .create_hub(&BridgeConfig::new("b-1"))
            .await
            .unwrap()
    }

    #[test]
    fn test_pending_resolution() {
        let registry = DeviceRegistry::new();
        registry.expect("a");
        registry.expect("b");
        registry.expect("a");
        assert_eq!(registry.pending(), vec!["a", "b"]);

        registry.remove_failed("a");
        assert!(!registry.all_pending_resolved());
        assert!(registry.is_failed("a"));

        let disabled: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(registry.prune_disabled(&disabled), 1);
        assert!(registry.all_pending_resolved());
    }

    #[tokio::test]
    async fn test_device_without_handle_is_add_failed() {
        let registry = DeviceRegistry::new();
        registry.expect("d-1");
        let device: Arc<dyn BridgedDevice> = FakeDevice::new("d-1");

        let outcome = registry.register(&device, &hub().await);
        assert!(matches!(
            outcome,
            RegistrationOutcome::AddFailed(DomainError::DeviceNotInitialized(_))
        ));
        assert!(registry.all_pending_resolved());
        assert!(registry.is_failed("d-1"));
        assert_eq!(registry.summary()[0].state, RegistrationState::AddFailed);
        assert!(registry.prepare_broadcast().is_empty());
    }

    #[tokio::test]
    async fn test_second_registration_is_a_no_op() {
        let registry = DeviceRegistry::new();
        let hub = hub().await;
        let device: Arc<dyn BridgedDevice> = FakeDevice::new("d-2");
        registry.register(&device, &hub);
        assert_eq!(
            registry.register(&device, &hub),
            RegistrationOutcome::AlreadyRegistered
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_forgets_device() {
        let registry = DeviceRegistry::new();
        let fake = FakeDevice::new("d-3");
        let device: Arc<dyn BridgedDevice> = fake.clone();
        registry.register(&device, &hub().await);
        assert!(registry.find_by_protocol_id("d3").is_some());

        assert!(registry.remove("d-3"));
        assert!(registry.find_by_protocol_id("d3").is_none());
        assert!(registry.is_empty());
        assert_eq!(fake.ready_signals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreadable_device_is_excluded_from_broadcast() {
        let engine = Arc::new(InMemoryEngine::new());
        let hub = engine.create_hub(&BridgeConfig::new("b-2")).await.unwrap();
        let registry = DeviceRegistry::new();
        let healthy = FakeDevice::with_handle("ok-1", Some(light_handle(&engine, "ok-1").await));
        let broken = FakeDevice::with_handle("bad-1", Some(light_handle(&engine, "bad-1").await));
        let healthy_device: Arc<dyn BridgedDevice> = healthy.clone();
        let broken_device: Arc<dyn BridgedDevice> = broken.clone();
        assert_eq!(registry.register(&healthy_device, &hub), RegistrationOutcome::Registered);
        assert_eq!(registry.register(&broken_device, &hub), RegistrationOutcome::Registered);

        engine.device("bad1").unwrap().poison("Validating bad1.onOff: broken");
        let ready = registry.prepare_broadcast();

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].node_id(), "ok-1");
        assert!(registry.is_failed("bad-1"));
        let summary = registry.summary();
        let record = summary.iter().find(|r| r.node_id == "bad-1").unwrap();
        assert_eq!(record.state, RegistrationState::ValidationFailed);

        let failures = broken.failures.lock();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].0, DomainError::ValidationFailed(_)));
        assert_eq!(failures[0].1, NodeStatus::validation_failed());
        assert!(healthy.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_device_is_claimed_by_one_broadcast_only() {
        let engine = Arc::new(InMemoryEngine::new());
        let hub = engine.create_hub(&BridgeConfig::new("b-3")).await.unwrap();
        let registry = DeviceRegistry::new();
        let device: Arc<dyn BridgedDevice> =
            FakeDevice::with_handle("lamp-1", Some(light_handle(&engine, "lamp-1").await));
        registry.register(&device, &hub);

        assert_eq!(registry.prepare_broadcast().len(), 1);
        assert!(registry.prepare_broadcast().is_empty());
        assert!(registry.summary()[0].notified);
    }
}
