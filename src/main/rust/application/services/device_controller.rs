use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::services::command_relay::{CommandRelay, HandleSource};
use crate::application::services::{
    BridgeController, DeviceRegistrationFactory, EventSubscriptionManager, RegistrationOutcome,
};
use crate::domain::entities::DeviceLifecycle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{BridgedDevice, DeviceHandle, MetricsReporter, NodeSink};
use crate::domain::value_objects::{
    DeviceConfig, DeviceIdentity, DeviceNodeConfig, DeviceState, Message, NodeStatus, OutputPort,
    SettlePolicy,
};

/// Outcome of device initialization awaited by input requests
#[derive(Debug, Clone, PartialEq)]
enum InitStatus {
    Pending,
    Ready,
    Failed(DomainError),
}

/// Drives one bridged device from configuration to event subscription
pub struct DeviceController {
    node: DeviceNodeConfig,
    protocol_id: String,
    bridge: Option<Arc<BridgeController>>,
    factory: Arc<DeviceRegistrationFactory>,
    sink: Arc<dyn NodeSink>,
    metrics: Arc<dyn MetricsReporter>,
    settle: SettlePolicy,
    relay: Arc<CommandRelay>,
    lifecycle: Mutex<DeviceLifecycle>,
    handle: RwLock<Option<Arc<dyn DeviceHandle>>>,
    subscriptions: EventSubscriptionManager,
    init_tx: watch::Sender<InitStatus>,
    init_failed: AtomicBool,
    closing: AtomicBool,
    last_status: Mutex<NodeStatus>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    self_ref: Weak<DeviceController>,
}

impl DeviceController {
    /// Create the controller and begin waiting for its bridge
    pub fn spawn(
        node: DeviceNodeConfig,
        bridge: Option<Arc<BridgeController>>,
        factory: Arc<DeviceRegistrationFactory>,
        sink: Arc<dyn NodeSink>,
        metrics: Arc<dyn MetricsReporter>,
        settle: SettlePolicy,
    ) -> Arc<Self> {
        let controller = Arc::new_cyclic(|self_ref: &Weak<DeviceController>| {
            let handles: Weak<dyn HandleSource> = self_ref.clone();
            let relay = CommandRelay::new(node.id.clone(), sink.clone(), metrics.clone(), handles)
                .with_auto_confirm(node.auto_confirm, settle.auto_confirm_delay());
            let (init_tx, _) = watch::channel(InitStatus::Pending);
            Self {
                protocol_id: DeviceIdentity::protocol_id_for(&node.id),
                subscriptions: EventSubscriptionManager::new(node.id.clone()),
                relay: Arc::new(relay),
                node,
                bridge,
                factory,
                sink,
                metrics,
                settle,
                lifecycle: Mutex::new(DeviceLifecycle::new()),
                handle: RwLock::new(None),
                init_tx,
                init_failed: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                last_status: Mutex::new(NodeStatus::not_running()),
                tasks: Mutex::new(Vec::new()),
                self_ref: self_ref.clone(),
            }
        });
        controller.set_status(NodeStatus::not_running());
        controller.begin();
        controller
    }

    fn begin(&self) {
        let config = match DeviceConfig::parse(&self.node.device_config) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(device = %self.node.id, error = %e, "Invalid device configuration");
                self.fail(e, NodeStatus::error());
                if let Some(bridge) = &self.bridge {
                    bridge.resolve_failed(&self.node.id);
                }
                return;
            }
        };
        tracing::info!(device = %self.node.id, device_type = %config.device_type(), "Loading device");
        self.transition(|l| l.transition_to_awaiting_bridge());

        let Some(bridge) = self.bridge.clone() else {
            tracing::error!(device = %self.node.id, "Bridge configuration not found");
            self.fail(DomainError::NoBridge, NodeStatus::no_bridge());
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(device = %self.node.id, "No async runtime, device cannot start");
            return;
        };
        let weak = self.self_ref.clone();
        let poll = self.settle.bridge_poll_interval();
        let task = runtime.spawn(async move {
            loop {
                {
                    let Some(controller) = weak.upgrade() else {
                        return;
                    };
                    if controller.closing.load(Ordering::SeqCst) {
                        return;
                    }
                }
                if bridge.has_hub() {
                    break;
                }
                tokio::time::sleep(poll).await;
            }
            if let Some(controller) = weak.upgrade() {
                controller.build_and_register(&config, &bridge).await;
            }
        });
        self.tasks.lock().push(task);
    }

    async fn build_and_register(&self, config: &DeviceConfig, bridge: &Arc<BridgeController>) {
        let identity = DeviceIdentity::new(self.node.id.clone(), self.node.name.clone());
        let built = match self.factory.build(&identity, config, self.relay.clone()).await {
            Ok(built) => built,
            Err(e) => {
                tracing::error!(device = %self.node.id, error = %e, "Failed to create device");
                self.fail(e, NodeStatus::error());
                bridge.resolve_failed(&self.node.id);
                return;
            }
        };
        for dropped in &built.dropped {
            tracing::warn!(device = %self.node.id, "Ignoring configuration entry: {}", dropped);
        }
        if self.closing.load(Ordering::SeqCst) {
            bridge.resolve_failed(&self.node.id);
            return;
        }
        *self.handle.write() = Some(built.handle);
        self.transition(|l| l.transition_to_awaiting_server_ready());

        let Some(me) = self.self_ref.upgrade() else {
            return;
        };
        match bridge.register(me) {
            RegistrationOutcome::Registered | RegistrationOutcome::AlreadyRegistered => {}
            RegistrationOutcome::AddFailed(e) => {
                self.fail(
                    DomainError::ValidationFailed(format!("Device initialization failed: {}", e)),
                    NodeStatus::init_failed(),
                );
            }
        }
    }

    async fn subscribe_when_settled(&self) {
        let Some(handle) = self.current_handle() else {
            self.fail(
                DomainError::DeviceNotInitialized("Device not available on ready".into()),
                NodeStatus::init_failed(),
            );
            return;
        };
        handle.settled(self.settle.subscription_settle()).await;
        if self.closing.load(Ordering::SeqCst) || self.is_init_failed() {
            return;
        }

        let verified = if handle.is_structurally_complete() {
            handle.state_snapshot().map(|_| ())
        } else {
            Err(DomainError::DeviceNotInitialized("Device structure incomplete".into()))
        };
        let subscribed = verified.and_then(|()| {
            self.subscriptions
                .subscribe(&handle, self.sink.clone(), self.metrics.clone())
        });
        match subscribed {
            Ok(count) => {
                if self.is_init_failed() {
                    return;
                }
                tracing::debug!(device = %self.node.id, subscriptions = count, "Events subscribed");
                if self.transition(|l| l.transition_to_ready()) {
                    self.set_status(NodeStatus::ready());
                    self.init_tx.send_replace(InitStatus::Ready);
                    tracing::info!(device = %self.node.id, "Device ready");
                }
            }
            Err(e) => {
                tracing::error!(device = %self.node.id, error = %e, "Device not properly initialized");
                self.fail(e, NodeStatus::init_failed());
            }
        }
    }

    /// Handle one inbound message once initialization is done
    pub async fn handle_input(&self, message: Message) -> Result<()> {
        if let Err(e) = self.wait_initialized().await {
            tracing::error!(device = %self.node.id, error = %e, "Device initialization failed");
            return Err(e);
        }
        let handle = self
            .current_handle()
            .ok_or_else(|| DomainError::DeviceNotInitialized(self.node.id.clone()))?;

        if message.is_state_query() {
            let snapshot = handle.state_snapshot()?;
            let mut reply = message;
            reply.payload = Value::Object(snapshot);
            self.sink.send(OutputPort::Events, reply);
            return Ok(());
        }

        let Value::Object(patch) = &message.payload else {
            tracing::debug!(device = %self.node.id, "Ignoring non-object payload");
            return Ok(());
        };
        match handle.set_state(patch.clone()).await {
            Ok(()) => {
                if self.node.passthrough {
                    self.sink.send(OutputPort::Events, message);
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(device = %self.node.id, error = %e, "Failed to update");
                self.metrics.report_update_failure();
                Err(match e {
                    DomainError::UpdateFailed(_) => e,
                    other => DomainError::UpdateFailed(other.to_string()),
                })
            }
        }
    }

    async fn wait_initialized(&self) -> Result<()> {
        let mut rx = self.init_tx.subscribe();
        let status = rx
            .wait_for(|status| *status != InitStatus::Pending)
            .await
            .map_err(|_| DomainError::DeviceNotInitialized(self.node.id.clone()))?
            .clone();
        match status {
            InitStatus::Ready => Ok(()),
            InitStatus::Failed(e) => Err(e),
            InitStatus::Pending => Err(DomainError::DeviceNotInitialized(self.node.id.clone())),
        }
    }

    /// Tear down; the handle itself is closed only when the node is removed
    pub async fn close(&self, removed: bool) -> Result<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(
            device = %self.node.id,
            "Closing device: {}, {}",
            self.node.id,
            if removed { "Device was removed/disabled" } else { "Device was restarted" }
        );
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let handle = self.current_handle();
        self.subscriptions.unsubscribe(handle.as_ref()).await;
        if let Some(bridge) = &self.bridge {
            bridge.unregister(&self.node.id);
        }
        self.init_tx.send_if_modified(|status| {
            if *status == InitStatus::Pending {
                *status = InitStatus::Failed(DomainError::DeviceNotInitialized(format!(
                    "{} closed before initialization",
                    self.node.id
                )));
                true
            } else {
                false
            }
        });

        if removed {
            if let Some(handle) = handle {
                handle.close().await?;
            }
        }
        Ok(())
    }

    /// Record a terminal failure; the first one wins
    fn fail(&self, error: DomainError, status: NodeStatus) {
        if self.init_failed.swap(true, Ordering::SeqCst) {
            tracing::debug!(device = %self.node.id, error = %error, "Device already failed");
            return;
        }
        tracing::error!(device = %self.node.id, error = %error, status = %status.text, "Device failed");
        let reason = error.to_string();
        match error {
            DomainError::ConfigError(_) | DomainError::NoBridge => {
                self.transition(|l| l.transition_to_config_error(reason))
            }
            _ => self.transition(|l| l.transition_to_validation_failed(reason)),
        };
        self.set_status(status);
        self.init_tx.send_replace(InitStatus::Failed(error));
    }

    fn transition(&self, apply: impl FnOnce(&mut DeviceLifecycle) -> bool) -> bool {
        let (from, to, moved) = {
            let mut lifecycle = self.lifecycle.lock();
            let from = lifecycle.current_state();
            let moved = apply(&mut lifecycle);
            (from, lifecycle.current_state(), moved)
        };
        if moved {
            tracing::debug!(device = %self.node.id, from = %from, to = %to, "Device state changed");
            self.metrics.report_device_transition(Some(from), to);
        }
        moved
    }

    fn set_status(&self, status: NodeStatus) {
        *self.last_status.lock() = status.clone();
        self.sink.status(status);
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn state(&self) -> DeviceState {
        self.lifecycle.lock().current_state()
    }

    /// When the device first entered `state`
    pub fn entered_at(&self, state: DeviceState) -> Option<Instant> {
        self.lifecycle.lock().entered_at(state)
    }

    /// Last status set by the controller itself
    pub fn last_status(&self) -> NodeStatus {
        self.last_status.lock().clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscriptions.is_subscribed()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.active_count()
    }
}

impl HandleSource for DeviceController {
    fn current_handle(&self) -> Option<Arc<dyn DeviceHandle>> {
        self.handle.read().clone()
    }
}

impl BridgedDevice for DeviceController {
    fn node_id(&self) -> &str {
        &self.node.id
    }

    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    fn handle(&self) -> Option<Arc<dyn DeviceHandle>> {
        self.current_handle()
    }

    fn is_init_failed(&self) -> bool {
        self.init_failed.load(Ordering::SeqCst)
    }

    fn on_failure(&self, error: DomainError, status: NodeStatus) {
        self.fail(error, status);
    }

    fn on_server_ready(&self) {
        if self.closing.load(Ordering::SeqCst) || self.is_init_failed() {
            tracing::info!(device = %self.node.id, "Device initialization failed, skipping event subscription");
            return;
        }
        if !self.transition(|l| l.transition_to_subscribing()) {
            tracing::debug!(device = %self.node.id, state = %self.state(), "Ignoring repeated readiness");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(device = %self.node.id, "No async runtime, events not subscribed");
            return;
        };
        let weak = self.self_ref.clone();
        let task = runtime.spawn(async move {
            if let Some(controller) = weak.upgrade() {
                controller.subscribe_when_settled().await;
            }
        });
        self.tasks.lock().push(task);
    }
}
