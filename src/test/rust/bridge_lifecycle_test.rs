use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use matter_dynamic_bridge::domain::ports::{BridgedDevice, Hub, MetricsReporter};
use matter_dynamic_bridge::domain::value_objects::{
    BridgeConfig, BridgeState, DeviceNodeConfig, DeviceState, EventSource, Message, OutputPort,
    SettlePolicy,
};
use matter_dynamic_bridge::{
    BridgeController, DeviceController, DeviceRegistrationFactory, InMemoryEngine,
    PrometheusReporter, RecordingSink,
};

fn settle() -> SettlePolicy {
    SettlePolicy::new(
        Duration::from_millis(5),
        Duration::from_millis(100),
        Duration::from_millis(100),
        Duration::from_millis(10),
    )
    .unwrap()
}

/// Records lifecycle events in arrival order
#[derive(Default)]
struct OrderingMetrics {
    events: Mutex<Vec<String>>,
}

impl OrderingMetrics {
    fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

impl MetricsReporter for OrderingMetrics {
    fn report_bridge_state(&self, _bridge_id: &str, state: BridgeState) {
        self.events.lock().push(format!("bridge:{}", state));
    }

    fn report_device_transition(&self, _from: Option<DeviceState>, to: DeviceState) {
        self.events.lock().push(format!("device:{}", to));
    }

    fn report_engine_fault(&self, matched: bool) {
        self.events.lock().push(format!("fault:{}", matched));
    }

    fn report_command(&self, cluster: &str, command: &str) {
        self.events.lock().push(format!("command:{}.{}", cluster, command));
    }

    fn report_attribute_event(&self) {}

    fn report_update_failure(&self) {
        self.events.lock().push("update_failure".to_string());
    }
}

struct Harness {
    engine: Arc<InMemoryEngine>,
    bridge: Arc<BridgeController>,
    factory: Arc<DeviceRegistrationFactory>,
    metrics: Arc<dyn MetricsReporter>,
}

impl Harness {
    fn new(bridge_id: &str) -> Self {
        Self::with_metrics(bridge_id, Arc::new(PrometheusReporter::new()))
    }

    fn with_metrics(bridge_id: &str, metrics: Arc<dyn MetricsReporter>) -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        let bridge = BridgeController::new(
            BridgeConfig::new(bridge_id),
            engine.clone(),
            settle(),
            metrics.clone(),
        );
        Self {
            factory: Arc::new(DeviceRegistrationFactory::new(engine.clone())),
            engine,
            bridge,
            metrics,
        }
    }

    fn device(&self, node: DeviceNodeConfig) -> (Arc<DeviceController>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let controller = DeviceController::spawn(
            node,
            Some(self.bridge.clone()),
            self.factory.clone(),
            sink.clone(),
            self.metrics.clone(),
            settle(),
        );
        (controller, sink)
    }

    fn expect(&self, ids: &[&str]) {
        for id in ids {
            self.bridge.expect_device(*id);
        }
    }

    fn hub(&self) -> Arc<dyn Hub> {
        self.bridge.hub().unwrap()
    }
}

fn node(id: &str, bridge: &str, device_type: &str) -> DeviceNodeConfig {
    DeviceNodeConfig::new(id, Some(bridge), json!({ "deviceType": device_type }))
}

async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn wait_ready(device: &DeviceController) {
    assert!(
        wait_until(|| device.state() == DeviceState::Ready).await,
        "{} stuck in {}",
        device.node_id(),
        device.state()
    );
}

#[tokio::test]
async fn test_single_light_reaches_ready_and_answers_state_query() {
    let harness = Harness::new("br-a");
    harness.expect(&["dev-a"]);
    let (device, sink) = harness.device(node("dev-a", "br-a", "OnOffLight"));
    harness.bridge.create().await.unwrap();

    wait_ready(&device).await;
    assert_eq!(harness.bridge.state(), BridgeState::Online);
    assert_eq!(device.last_status().text, "ready");

    let query = Message::new(json!(null)).with_topic("state");
    device.handle_input(query).await.unwrap();
    let replies = sink.messages(OutputPort::Events);
    let reply = replies.last().unwrap();
    assert_eq!(reply.topic.as_deref(), Some("state"));
    let state = reply.payload.as_object().unwrap();
    assert!(!state.is_empty());
    assert_eq!(state["onOff"]["onOff"], json!(false));
}

#[tokio::test]
async fn test_unknown_device_type_fails_alone() {
    let harness = Harness::new("br-b");
    harness.expect(&["good", "bad"]);
    let (good, _) = harness.device(node("good", "br-b", "OnOffLight"));
    let (bad, bad_sink) = harness.device(node("bad", "br-b", "Toaster"));
    harness.bridge.create().await.unwrap();

    wait_ready(&good).await;
    assert!(wait_until(|| bad.state().is_terminal()).await);
    assert_eq!(bad.state(), DeviceState::ValidationFailed);
    assert_eq!(bad_sink.last_status().unwrap().text, "error");
    assert!(wait_until(|| harness.bridge.state() == BridgeState::Online).await);
    assert!(harness.bridge.registry().is_failed("bad"));
}

#[tokio::test]
async fn test_update_with_passthrough_echoes_request() {
    let harness = Harness::new("br-c");
    harness.expect(&["lamp"]);
    let (device, sink) = harness.device(node("lamp", "br-c", "OnOffLight").with_passthrough(true));
    harness.bridge.create().await.unwrap();
    wait_ready(&device).await;

    let request = Message::new(json!({"onOff": {"onOff": true}})).with_topic("set");
    device.handle_input(request.clone()).await.unwrap();

    let events = sink.messages(OutputPort::Events);
    assert!(events.contains(&request));
    let change = events
        .iter()
        .find(|m| m.topic.is_none())
        .expect("attribute change event");
    assert_eq!(change.payload, json!({"onOff": {"onOff": true}}));
    assert_eq!(change.event_source, Some(EventSource::local()));
}

#[tokio::test]
async fn test_rejected_update_is_reported_not_fatal() {
    let harness = Harness::new("br-c2");
    harness.expect(&["lamp"]);
    let (device, sink) = harness.device(node("lamp", "br-c2", "OnOffLight").with_passthrough(true));
    harness.bridge.create().await.unwrap();
    wait_ready(&device).await;

    let result = device
        .handle_input(Message::new(json!({"onOff": {"brightness": 3}})))
        .await;
    assert!(matches!(
        result,
        Err(matter_dynamic_bridge::DomainError::UpdateFailed(_))
    ));
    assert!(sink.messages(OutputPort::Events).is_empty());
    assert_eq!(device.state(), DeviceState::Ready);
}

#[tokio::test]
async fn test_close_restart_keeps_handle_and_removal_closes_it() {
    let harness = Harness::new("br-d");
    harness.expect(&["keep", "drop"]);
    let (keep, _) = harness.device(node("keep", "br-d", "OnOffLight"));
    let (gone, _) = harness.device(node("drop", "br-d", "ContactSensor"));
    harness.bridge.create().await.unwrap();
    wait_ready(&keep).await;
    wait_ready(&gone).await;
    assert!(keep.subscription_count() > 0);

    keep.close(false).await.unwrap();
    assert!(!keep.is_subscribed());
    assert_eq!(keep.subscription_count(), 0);
    assert!(harness.bridge.registry().find_by_protocol_id("keep").is_none());
    let engine_device = harness.engine.device("keep").unwrap();
    assert!(!matter_dynamic_bridge::DeviceHandle::is_closed(engine_device.as_ref()));
    assert_eq!(engine_device.listener_count(), 0);

    gone.close(true).await.unwrap();
    assert!(harness.bridge.registry().is_empty());
    let engine_device = harness.engine.device("drop").unwrap();
    assert!(matter_dynamic_bridge::DeviceHandle::is_closed(engine_device.as_ref()));
}

#[tokio::test]
async fn test_closing_last_pending_device_lets_siblings_start() {
    let harness = Harness::new("br-pend");
    harness.expect(&["first", "second"]);
    let (first, _) = harness.device(node("first", "br-pend", "OnOffLight"));
    harness.bridge.create().await.unwrap();
    assert!(wait_until(|| first.state() == DeviceState::AwaitingServerReady).await);
    assert_eq!(harness.bridge.registry().pending(), vec!["second"]);
    assert_eq!(harness.bridge.state(), BridgeState::Ready);

    let (second, _) = harness.device(node("second", "br-pend", "ContactSensor"));
    second.close(true).await.unwrap();

    assert!(harness.bridge.registry().all_pending_resolved());
    wait_ready(&first).await;
    assert_eq!(harness.bridge.state(), BridgeState::Online);
    assert!(harness.engine.device("second").is_none());
}

#[tokio::test]
async fn test_engine_fault_is_isolated_to_one_device() {
    let harness = Harness::new("br-iso");
    harness.expect(&["x-1", "y-1", "z-1"]);
    let (x, x_sink) = harness.device(node("x-1", "br-iso", "Thermostat"));
    let (y, y_sink) = harness.device(node("y-1", "br-iso", "OnOffLight"));
    let (z, _) = harness.device(node("z-1", "br-iso", "TemperatureSensor"));
    harness.bridge.create().await.unwrap();

    wait_ready(&y).await;
    wait_ready(&z).await;
    assert!(wait_until(|| x.state() == DeviceState::ValidationFailed).await);
    assert!(x.is_init_failed());
    assert!(x_sink.last_status().unwrap().is_fault());
    assert!(!x.is_subscribed());

    let hub = harness.hub();
    assert!(wait_until(|| !hub.aggregate_contains("x1")).await);
    assert!(hub.aggregate_contains("y1"));
    assert!(hub.aggregate_contains("z1"));
    assert_eq!(harness.bridge.state(), BridgeState::Online);
    assert!(harness.bridge.registry().is_failed("x-1"));

    // Siblings keep working after the fault
    let patch = json!({"onOff": {"onOff": true}}).as_object().unwrap().clone();
    y.handle().unwrap().set_state(patch).await.unwrap();
    assert_eq!(y_sink.messages(OutputPort::Events).len(), 1);

    let waiting = x.handle_input(Message::new(json!({}))).await;
    assert!(waiting.is_err());
}

#[tokio::test]
async fn test_fault_on_device_added_after_start() {
    let harness = Harness::new("br-late");
    harness.bridge.create().await.unwrap();
    assert!(wait_until(|| harness.bridge.state() == BridgeState::Online).await);

    let (late, late_sink) = harness.device(node("late-1", "br-late", "Thermostat"));
    let (fine, _) = harness.device(node("fine-1", "br-late", "DimmableLight"));

    wait_ready(&fine).await;
    assert!(wait_until(|| late.state() == DeviceState::ValidationFailed).await);
    assert!(late_sink.last_status().unwrap().is_fault());
    assert_eq!(harness.bridge.state(), BridgeState::Online);
}

#[tokio::test]
async fn test_readiness_follows_hub_start() {
    let metrics = Arc::new(OrderingMetrics::default());
    let harness = Harness::with_metrics("br-order", metrics.clone());
    harness.expect(&["o-1", "o-2"]);
    let (first, _) = harness.device(node("o-1", "br-order", "OnOffLight"));
    let (second, _) = harness.device(node("o-2", "br-order", "ContactSensor"));
    harness.bridge.create().await.unwrap();
    wait_ready(&first).await;
    wait_ready(&second).await;

    let online = metrics.position("bridge:ONLINE").unwrap();
    let subscribing = metrics.position("device:SUBSCRIBING_EVENTS").unwrap();
    assert!(online < subscribing);
    assert_eq!(metrics.count("device:SUBSCRIBING_EVENTS"), 2);

    let first_subscribe = first.entered_at(DeviceState::SubscribingEvents).unwrap();
    let first_ready = first.entered_at(DeviceState::Ready).unwrap();
    assert!(first_subscribe <= first_ready);
}

#[tokio::test]
async fn test_repeated_readiness_does_not_duplicate_subscriptions() {
    let harness = Harness::new("br-idem");
    harness.expect(&["lamp-1"]);
    let (device, sink) = harness.device(node("lamp-1", "br-idem", "OnOffLight"));
    harness.bridge.create().await.unwrap();
    wait_ready(&device).await;
    let subscriptions = device.subscription_count();
    let listeners = harness.engine.device("lamp1").unwrap().listener_count();

    harness.bridge.start().await.unwrap();
    assert_eq!(harness.bridge.notify_devices_ready(), 0);
    BridgedDevice::on_server_ready(device.as_ref());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.subscription_count(), subscriptions);
    assert_eq!(
        harness.engine.device("lamp1").unwrap().listener_count(),
        listeners
    );

    let patch = json!({"onOff": {"onOff": true}}).as_object().unwrap().clone();
    device.handle().unwrap().set_state(patch).await.unwrap();
    assert_eq!(sink.messages(OutputPort::Events).len(), 1);
}

#[tokio::test]
async fn test_commands_are_relayed_and_auto_confirmed() {
    let metrics = Arc::new(OrderingMetrics::default());
    let harness = Harness::with_metrics("br-cmd", metrics.clone());
    harness.expect(&["lock-1"]);
    let (device, sink) = harness.device(node("lock-1", "br-cmd", "DoorLock").with_auto_confirm(true));
    harness.bridge.create().await.unwrap();
    wait_ready(&device).await;

    let engine_device = harness.engine.device("lock1").unwrap();
    let response = engine_device
        .invoke_command(
            "DoorLock",
            "unlockDoor",
            json!({"pinCode": null}),
            Some(EventSource::remote("fe80::1", 5540)),
        )
        .await
        .unwrap();
    assert_eq!(response, None);

    let commands = sink.messages(OutputPort::Commands);
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].payload,
        json!({"command": "unlockDoor", "cluster": "DoorLock", "data": {"pinCode": null}})
    );
    assert_eq!(metrics.count("command:DoorLock.unlockDoor"), 1);

    assert!(wait_until(|| !sink.messages(OutputPort::Events).is_empty()).await);
    let confirmed = &sink.messages(OutputPort::Events)[0];
    assert_eq!(confirmed.payload, json!({"doorLock": {"lockState": 2}}));
    assert_eq!(confirmed.event_source, Some(EventSource::local()));
}

#[tokio::test]
async fn test_remote_command_carries_peer_context() {
    let harness = Harness::new("br-peer");
    harness.expect(&["plug-1"]);
    let (device, sink) = harness.device(node("plug-1", "br-peer", "OnOffPlugInUnit"));
    harness.bridge.create().await.unwrap();
    wait_ready(&device).await;

    harness
        .engine
        .device("plug1")
        .unwrap()
        .invoke_command("OnOff", "toggle", json!({}), Some(EventSource::remote("fe80::2", 5541)))
        .await
        .unwrap();

    let events = sink.messages(OutputPort::Events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, json!({"onOff": {"onOff": true}}));
    assert_eq!(events[0].event_source, Some(EventSource::remote("fe80::2", 5541)));
}

#[tokio::test]
async fn test_device_without_bridge_never_registers() {
    let harness = Harness::new("br-none");
    let sink = Arc::new(RecordingSink::default());
    let device = DeviceController::spawn(
        node("orphan", "missing", "OnOffLight"),
        None,
        harness.factory.clone(),
        sink.clone(),
        harness.metrics.clone(),
        settle(),
    );
    assert_eq!(sink.last_status().unwrap().text, "no bridge");
    assert_eq!(device.state(), DeviceState::ConfigError);
    assert!(harness.engine.device("orphan").is_none());
}
