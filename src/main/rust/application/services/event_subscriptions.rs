use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    DeviceHandle, IdentifySignal, MetricsReporter, NodeSink, SubscriptionHandle,
};
use crate::domain::value_objects::{Message, NodeStatus, OutputPort};

/// Live subscriptions of one device
#[derive(Default)]
struct SubscriptionTable {
    attributes: HashMap<(String, String), SubscriptionHandle>,
    identify_start: Option<SubscriptionHandle>,
    identify_stop: Option<SubscriptionHandle>,
}

impl SubscriptionTable {
    fn drain(&mut self) -> Vec<SubscriptionHandle> {
        let mut handles: Vec<SubscriptionHandle> =
            self.attributes.drain().map(|(_, handle)| handle).collect();
        handles.extend(self.identify_start.take());
        handles.extend(self.identify_stop.take());
        handles
    }

    fn len(&self) -> usize {
        self.attributes.len()
            + usize::from(self.identify_start.is_some())
            + usize::from(self.identify_stop.is_some())
    }
}

/// Per-device bookkeeping of attribute change and identify subscriptions
pub struct EventSubscriptionManager {
    device_id: String,
    subscribed: AtomicBool,
    table: Mutex<SubscriptionTable>,
}

impl EventSubscriptionManager {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            subscribed: AtomicBool::new(false),
            table: Mutex::new(SubscriptionTable::default()),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Number of handles currently held
    pub fn active_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Subscribe to every observable attribute; returns the number of new handles
    pub fn subscribe(
        &self,
        handle: &Arc<dyn DeviceHandle>,
        sink: Arc<dyn NodeSink>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Result<usize> {
        if !handle.is_structurally_complete() {
            return Err(DomainError::DeviceNotInitialized(format!(
                "{} has no live state or event view",
                handle.protocol_id()
            )));
        }
        if self.subscribed.swap(true, Ordering::SeqCst) {
            debug!(device = %self.device_id, "Events already subscribed, skipping");
            return Ok(0);
        }

        let mut table = self.table.lock();
        for capability in handle.capabilities() {
            if capability == "identify" && handle.supports_identify() {
                self.subscribe_identify(handle, &sink, &mut table);
                continue;
            }

            for attribute in handle.observable_attributes(&capability) {
                let listener = {
                    let sink = sink.clone();
                    let metrics = metrics.clone();
                    let capability = capability.clone();
                    let attribute = attribute.clone();
                    Arc::new(move |value: Value, source| {
                        let mut inner = Map::new();
                        inner.insert(attribute.clone(), value);
                        let mut payload = Map::new();
                        payload.insert(capability.clone(), Value::Object(inner));
                        metrics.report_attribute_event();
                        sink.send(
                            OutputPort::Events,
                            Message::new(Value::Object(payload))
                                .with_event_source(source)
                                .with_message_id(),
                        );
                    })
                };

                match handle.subscribe_attribute(&capability, &attribute, listener) {
                    Ok(subscription) => {
                        table
                            .attributes
                            .insert((capability.clone(), attribute), subscription);
                    }
                    Err(e) => {
                        error!(
                            device = %self.device_id,
                            capability = %capability,
                            attribute = %attribute,
                            error = %e,
                            "Failed to subscribe to attribute"
                        );
                    }
                }
            }
        }

        debug!(device = %self.device_id, handles = table.len(), "Events subscribed");
        Ok(table.len())
    }

    fn subscribe_identify(
        &self,
        handle: &Arc<dyn DeviceHandle>,
        sink: &Arc<dyn NodeSink>,
        table: &mut SubscriptionTable,
    ) {
        for signal in [IdentifySignal::Start, IdentifySignal::Stop] {
            let sink = sink.clone();
            let listener = Arc::new(move || {
                sink.status(match signal {
                    IdentifySignal::Start => NodeStatus::identify(),
                    IdentifySignal::Stop => NodeStatus::ready(),
                })
            });
            match handle.subscribe_identify(signal, listener) {
                Ok(subscription) => match signal {
                    IdentifySignal::Start => table.identify_start = Some(subscription),
                    IdentifySignal::Stop => table.identify_stop = Some(subscription),
                },
                Err(e) => {
                    error!(device = %self.device_id, ?signal, error = %e, "Failed to subscribe to identify");
                }
            }
        }
    }

    /// Remove every recorded handle; individual failures are logged and skipped
    pub async fn unsubscribe(&self, handle: Option<&Arc<dyn DeviceHandle>>) {
        let handles = self.table.lock().drain();
        if let Some(device) = handle {
            for subscription in &handles {
                if let Err(e) = device.unsubscribe(subscription).await {
                    warn!(device = %self.device_id, error = %e, "Failed to remove subscription");
                }
            }
        }
        self.subscribed.store(false, Ordering::SeqCst);
        debug!(device = %self.device_id, removed = handles.len(), "Events unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::engine::InMemoryEngine;
    use crate::infrastructure::host::RecordingSink;
    use crate::infrastructure::metrics::PrometheusReporter;
    use crate::application::services::DeviceRegistrationFactory;
    use crate::domain::ports::{CommandInvocation, CommandSink, Hub, ProtocolEngine};
    use crate::domain::value_objects::{BridgeConfig, DeviceConfig, DeviceIdentity};
    use serde_json::json;

    struct NoCommands;

    impl CommandSink for NoCommands {
        fn on_command(&self, _invocation: &CommandInvocation) {}
    }

    async fn installed_light(engine: &Arc<InMemoryEngine>) -> Arc<dyn DeviceHandle> {
        let factory = DeviceRegistrationFactory::new(engine.clone());
        let config = DeviceConfig::parse(&json!({"deviceType": "OnOffLight"})).unwrap();
        let built = factory
            .build(&DeviceIdentity::new("aa-11", "Lamp"), &config, Arc::new(NoCommands))
            .await
            .unwrap();
        let hub = engine.create_hub(&BridgeConfig::new("b-1")).await.unwrap();
        hub.add_to_aggregate(built.handle.clone()).unwrap();
        built.handle
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let engine = Arc::new(InMemoryEngine::new());
        let handle = installed_light(&engine).await;
        let sink = Arc::new(RecordingSink::default());
        let manager = EventSubscriptionManager::new("aa-11");
        let metrics = Arc::new(PrometheusReporter::new());

        let first = manager.subscribe(&handle, sink.clone(), metrics.clone()).unwrap();
        assert!(first > 0);
        assert_eq!(manager.subscribe(&handle, sink.clone(), metrics).unwrap(), 0);
        assert_eq!(engine.device("aa11").unwrap().listener_count(), first);

        let patch = json!({"onOff": {"onOff": true}}).as_object().unwrap().clone();
        handle.set_state(patch).await.unwrap();
        let events = sink.messages(OutputPort::Events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, json!({"onOff": {"onOff": true}}));
        assert_eq!(events[0].event_source.as_ref().map(|s| s.local), Some(true));
    }

    #[tokio::test]
    async fn test_identify_maps_to_status_only() {
        let engine = Arc::new(InMemoryEngine::new());
        let handle = installed_light(&engine).await;
        let sink = Arc::new(RecordingSink::default());
        let manager = EventSubscriptionManager::new("aa-11");
        manager
            .subscribe(&handle, sink.clone(), Arc::new(PrometheusReporter::new()))
            .unwrap();

        let device = engine.device("aa11").unwrap();
        device
            .invoke_command("Identify", "identify", json!({"identifyTime": 5}), None)
            .await
            .unwrap();
        device
            .invoke_command("Identify", "identify", json!({"identifyTime": 0}), None)
            .await
            .unwrap();

        let texts: Vec<String> = sink.statuses().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["identify", "ready"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_everything() {
        let engine = Arc::new(InMemoryEngine::new());
        let handle = installed_light(&engine).await;
        let manager = EventSubscriptionManager::new("aa-11");
        manager
            .subscribe(
                &handle,
                Arc::new(RecordingSink::default()),
                Arc::new(PrometheusReporter::new()),
            )
            .unwrap();
        assert!(manager.active_count() > 0);

        manager.unsubscribe(Some(&handle)).await;
        assert_eq!(manager.active_count(), 0);
        assert!(!manager.is_subscribed());
        assert_eq!(engine.device("aa11").unwrap().listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_survives_closed_handle() {
        let engine = Arc::new(InMemoryEngine::new());
        let handle = installed_light(&engine).await;
        let manager = EventSubscriptionManager::new("aa-11");
        manager
            .subscribe(
                &handle,
                Arc::new(RecordingSink::default()),
                Arc::new(PrometheusReporter::new()),
            )
            .unwrap();

        handle.close().await.unwrap();
        manager.unsubscribe(Some(&handle)).await;
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_incomplete_handle() {
        let engine = Arc::new(InMemoryEngine::new());
        let factory = DeviceRegistrationFactory::new(engine.clone());
        let config = DeviceConfig::parse(&json!({"deviceType": "OnOffLight"})).unwrap();
        let built = factory
            .build(&DeviceIdentity::new("cc", "Lamp"), &config, Arc::new(NoCommands))
            .await
            .unwrap();
        let manager = EventSubscriptionManager::new("cc");
        let result = manager.subscribe(
            &built.handle,
            Arc::new(RecordingSink::default()),
            Arc::new(PrometheusReporter::new()),
        );
        assert!(matches!(result, Err(DomainError::DeviceNotInitialized(_))));
        assert!(!manager.is_subscribed());
    }
}
