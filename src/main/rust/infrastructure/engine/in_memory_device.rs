use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    AttributeListener, CommandInvocation, CommandSink, DeviceHandle, IdentifySignal,
    SignalListener, SubscriptionHandle,
};
use crate::domain::value_objects::{DeviceBlueprint, EventSource};
use crate::infrastructure::engine::catalog::{ClusterDef, StaticCatalog};

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Constructed,
    Installed,
    Poisoned(String),
    Closed,
}

#[derive(Default)]
struct Listeners {
    attributes: HashMap<(String, String), Vec<(u64, AttributeListener)>>,
    identify: HashMap<IdentifySignal, Vec<(u64, SignalListener)>>,
}

impl Listeners {
    fn count(&self) -> usize {
        self.attributes.values().map(Vec::len).sum::<usize>()
            + self.identify.values().map(Vec::len).sum::<usize>()
    }
}

/// Engine-side endpoint of one bridged device
pub struct InMemoryDevice {
    protocol_id: String,
    device_type: String,
    clusters: Vec<(ClusterDef, Vec<String>)>,
    endpoint: Map<String, Value>,
    state: RwLock<Map<String, Value>>,
    listeners: Mutex<Listeners>,
    next_listener: AtomicU64,
    stage: RwLock<Stage>,
    commands: Arc<dyn CommandSink>,
    settled_tx: watch::Sender<bool>,
}

impl InMemoryDevice {
    pub(crate) fn construct(
        catalog: &StaticCatalog,
        blueprint: &DeviceBlueprint,
        commands: Arc<dyn CommandSink>,
    ) -> Result<Self> {
        let mut clusters = Vec::with_capacity(blueprint.behaviors.len());
        let mut state = Map::new();
        for behavior in &blueprint.behaviors {
            let def = catalog
                .cluster(&behavior.name)
                .ok_or_else(|| DomainError::UnknownBehavior(behavior.name.clone()))?;
            state.insert(
                def.state_key.clone(),
                Value::Object(def.initial_state(&behavior.features)),
            );
            clusters.push((def.clone(), behavior.features.clone()));
        }

        let (settled_tx, _) = watch::channel(false);
        Ok(Self {
            protocol_id: blueprint.identity.protocol_id().to_string(),
            device_type: blueprint.device_type.clone(),
            clusters,
            endpoint: blueprint.endpoint.clone(),
            state: RwLock::new(state),
            listeners: Mutex::new(Listeners::default()),
            next_listener: AtomicU64::new(1),
            stage: RwLock::new(Stage::Constructed),
            commands,
            settled_tx,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Number of live change and identify listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().count()
    }

    /// Apply the endpoint configuration; runs when added to an aggregate
    pub(crate) fn install(&self) -> Result<()> {
        let mut staged = self.state.read().clone();
        for (key, value) in &self.endpoint {
            if key == "id" {
                continue;
            }
            let Some(Value::Object(current)) = staged.get_mut(key) else {
                return Err(DomainError::ValidationFailed(format!(
                    "Validating {}: unknown cluster {}",
                    self.protocol_id, key
                )));
            };
            let Value::Object(attributes) = value else {
                return Err(DomainError::ValidationFailed(format!(
                    "Validating {}.{}: expected an attribute object",
                    self.protocol_id, key
                )));
            };
            for (attribute, attr_value) in attributes {
                if !current.contains_key(attribute) {
                    return Err(DomainError::ValidationFailed(format!(
                        "Validating {}.{}: unknown attribute {}",
                        self.protocol_id, key, attribute
                    )));
                }
                current.insert(attribute.clone(), attr_value.clone());
            }
        }
        *self.state.write() = staged;
        *self.stage.write() = Stage::Installed;
        Ok(())
    }

    /// First feature constraint the device violates, as `<path>: <reason>`
    pub(crate) fn validation_error(&self) -> Option<String> {
        self.clusters.iter().find_map(|(def, features)| {
            def.constraint_violation(features)
                .map(|reason| format!("{}.{}: {}", self.protocol_id, def.state_key, reason))
        })
    }

    pub(crate) fn poison(&self, reason: impl Into<String>) {
        let mut stage = self.stage.write();
        if *stage != Stage::Closed {
            *stage = Stage::Poisoned(reason.into());
        }
    }

    pub(crate) fn mark_settled(&self) {
        self.settled_tx.send_replace(true);
    }

    /// Deliver a command as a protocol peer would
    pub async fn invoke_command(
        &self,
        cluster: &str,
        command: &str,
        data: Value,
        source: Option<EventSource>,
    ) -> Result<Option<Value>> {
        self.ensure_usable()?;
        let (def, _) = self
            .clusters
            .iter()
            .find(|(def, _)| def.name == cluster || def.state_key == cluster)
            .ok_or_else(|| DomainError::UnknownBehavior(cluster.to_string()))?;
        let command_def = def.command_def(command).ok_or_else(|| {
            DomainError::UpdateFailed(format!("{} has no command {}", def.name, command))
        })?;

        let invocation = CommandInvocation {
            cluster: def.name.clone(),
            command: command.to_string(),
            data: data.clone(),
            expects_response: command_def.expects_response,
        };
        self.commands.on_command(&invocation);

        if !command_def.implemented {
            return Ok(self.commands.unimplemented_response(&invocation));
        }

        if let Some(patch) = self.builtin_effect(&def.state_key, command, &data) {
            self.write(patch, source)?;
        }
        Ok(None)
    }

    fn builtin_effect(&self, state_key: &str, command: &str, data: &Value) -> Option<Map<String, Value>> {
        let mut patch = Map::new();
        match (state_key, command) {
            ("onOff", "on") => {
                patch.insert("onOff".into(), json!({"onOff": true}));
            }
            ("onOff", "off") => {
                patch.insert("onOff".into(), json!({"onOff": false}));
            }
            ("onOff", "toggle") => {
                let current = self.attribute("onOff", "onOff")?.as_bool().unwrap_or(false);
                patch.insert("onOff".into(), json!({"onOff": !current}));
            }
            ("levelControl", "moveToLevel") => {
                patch.insert("levelControl".into(), json!({"currentLevel": data.get("level")?}));
            }
            ("levelControl", "moveToLevelWithOnOff") => {
                let level = data.get("level")?;
                patch.insert("levelControl".into(), json!({"currentLevel": level}));
                if self.has_capability("onOff") {
                    let on = level.as_u64().unwrap_or(0) > 0;
                    patch.insert("onOff".into(), json!({"onOff": on}));
                }
            }
            ("identify", "identify") => {
                patch.insert(
                    "identify".into(),
                    json!({"identifyTime": data.get("identifyTime")?}),
                );
            }
            ("colorControl", "moveToColorTemperature") => {
                patch.insert(
                    "colorControl".into(),
                    json!({"colorTemperatureMireds": data.get("colorTemperatureMireds")?, "colorMode": 2}),
                );
            }
            ("colorControl", "moveToHue") => {
                patch.insert(
                    "colorControl".into(),
                    json!({"currentHue": data.get("hue")?, "colorMode": 0}),
                );
            }
            ("colorControl", "moveToSaturation") => {
                patch.insert(
                    "colorControl".into(),
                    json!({"currentSaturation": data.get("saturation")?, "colorMode": 0}),
                );
            }
            ("colorControl", "moveToHueAndSaturation") => {
                patch.insert(
                    "colorControl".into(),
                    json!({"currentHue": data.get("hue")?, "currentSaturation": data.get("saturation")?, "colorMode": 0}),
                );
            }
            ("colorControl", "moveToColor") => {
                patch.insert(
                    "colorControl".into(),
                    json!({"currentX": data.get("colorX")?, "currentY": data.get("colorY")?, "colorMode": 1}),
                );
            }
            _ => return None,
        }
        Some(patch)
    }

    fn has_capability(&self, state_key: &str) -> bool {
        self.clusters.iter().any(|(def, _)| def.state_key == state_key)
    }

    fn attribute(&self, capability: &str, attribute: &str) -> Option<Value> {
        self.state.read().get(capability)?.get(attribute).cloned()
    }

    fn ensure_usable(&self) -> Result<()> {
        match &*self.stage.read() {
            Stage::Constructed | Stage::Installed => Ok(()),
            Stage::Poisoned(reason) => Err(DomainError::DeviceNotInitialized(format!(
                "Behaviors have errors: {}",
                reason
            ))),
            Stage::Closed => Err(DomainError::DeviceNotInitialized(format!(
                "{} is closed",
                self.protocol_id
            ))),
        }
    }

    /// Validate the whole patch, apply it, then fire listeners outside the locks
    fn write(&self, patch: Map<String, Value>, source: Option<EventSource>) -> Result<()> {
        let mut changes = Vec::new();
        {
            let mut state = self.state.write();
            for (capability, value) in &patch {
                let current = state
                    .get(capability)
                    .and_then(Value::as_object)
                    .ok_or_else(|| {
                        DomainError::UpdateFailed(format!("unknown capability {}", capability))
                    })?;
                let attributes = value.as_object().ok_or_else(|| {
                    DomainError::UpdateFailed(format!("{} must be an object", capability))
                })?;
                if let Some(unknown) = attributes.keys().find(|a| !current.contains_key(*a)) {
                    return Err(DomainError::UpdateFailed(format!(
                        "unknown attribute {}.{}",
                        capability, unknown
                    )));
                }
            }

            for (capability, value) in patch {
                let Some(Value::Object(current)) = state.get_mut(&capability) else {
                    continue;
                };
                if let Value::Object(attributes) = value {
                    for (attribute, new_value) in attributes {
                        let old = current.insert(attribute.clone(), new_value.clone());
                        if old.as_ref() != Some(&new_value) {
                            changes.push((capability.clone(), attribute, old, new_value));
                        }
                    }
                }
            }
        }

        for (capability, attribute, old, new_value) in changes {
            if capability == "identify" && attribute == "identifyTime" {
                self.fire_identify(&old, &new_value);
            }
            let listeners: Vec<AttributeListener> = self
                .listeners
                .lock()
                .attributes
                .get(&(capability, attribute))
                .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default();
            for listener in listeners {
                listener(new_value.clone(), source.clone());
            }
        }
        Ok(())
    }

    fn fire_identify(&self, old: &Option<Value>, new_value: &Value) {
        let was_active = old.as_ref().and_then(Value::as_u64).unwrap_or(0) > 0;
        let active = new_value.as_u64().unwrap_or(0) > 0;
        let signal = match (was_active, active) {
            (false, true) => IdentifySignal::Start,
            (true, false) => IdentifySignal::Stop,
            _ => return,
        };
        let listeners: Vec<SignalListener> = self
            .listeners
            .lock()
            .identify
            .get(&signal)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener();
        }
    }

    fn next_id(&self) -> u64 {
        self.next_listener.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl DeviceHandle for InMemoryDevice {
    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    fn is_structurally_complete(&self) -> bool {
        matches!(*self.stage.read(), Stage::Installed) && !self.state.read().is_empty()
    }

    fn capabilities(&self) -> Vec<String> {
        self.clusters
            .iter()
            .map(|(def, _)| def.state_key.clone())
            .collect()
    }

    fn observable_attributes(&self, capability: &str) -> Vec<String> {
        let Some((def, _)) = self.clusters.iter().find(|(def, _)| def.state_key == capability)
        else {
            return Vec::new();
        };
        let state = self.state.read();
        let Some(Value::Object(attributes)) = state.get(capability) else {
            return Vec::new();
        };
        attributes
            .keys()
            .filter(|name| def.is_observable(name))
            .cloned()
            .collect()
    }

    fn supports_identify(&self) -> bool {
        self.has_capability("identify")
    }

    fn subscribe_attribute(
        &self,
        capability: &str,
        attribute: &str,
        listener: AttributeListener,
    ) -> Result<SubscriptionHandle> {
        self.ensure_usable()?;
        if !self.observable_attributes(capability).iter().any(|a| a == attribute) {
            return Err(DomainError::DeviceNotInitialized(format!(
                "{}.{} has no change signal",
                capability, attribute
            )));
        }
        let listener_id = self.next_id();
        self.listeners
            .lock()
            .attributes
            .entry((capability.to_string(), attribute.to_string()))
            .or_default()
            .push((listener_id, listener));
        Ok(SubscriptionHandle::Attribute {
            capability: capability.to_string(),
            attribute: attribute.to_string(),
            listener_id,
        })
    }

    fn subscribe_identify(
        &self,
        signal: IdentifySignal,
        listener: SignalListener,
    ) -> Result<SubscriptionHandle> {
        self.ensure_usable()?;
        let listener_id = self.next_id();
        self.listeners
            .lock()
            .identify
            .entry(signal)
            .or_default()
            .push((listener_id, listener));
        Ok(SubscriptionHandle::Identify {
            signal,
            listener_id,
        })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let mut listeners = self.listeners.lock();
        let removed = match handle {
            SubscriptionHandle::Attribute {
                capability,
                attribute,
                listener_id,
            } => listeners
                .attributes
                .get_mut(&(capability.clone(), attribute.clone()))
                .map(|entries| {
                    let before = entries.len();
                    entries.retain(|(id, _)| id != listener_id);
                    before != entries.len()
                }),
            SubscriptionHandle::Identify {
                signal,
                listener_id,
            } => listeners.identify.get_mut(signal).map(|entries| {
                let before = entries.len();
                entries.retain(|(id, _)| id != listener_id);
                before != entries.len()
            }),
        };
        match removed {
            Some(true) => Ok(()),
            _ => Err(DomainError::UpdateFailed(format!(
                "no such subscription on {}",
                self.protocol_id
            ))),
        }
    }

    fn state_snapshot(&self) -> Result<Map<String, Value>> {
        self.ensure_usable()?;
        Ok(self.state.read().clone())
    }

    async fn set_state(&self, patch: Map<String, Value>) -> Result<()> {
        self.ensure_usable()?;
        self.write(patch, Some(EventSource::local()))
    }

    async fn settled(&self, fallback: Duration) {
        let mut rx = self.settled_tx.subscribe();
        let wait = async move {
            let _ = rx.wait_for(|settled| *settled).await;
        };
        let _ = tokio::time::timeout(fallback, wait).await;
    }

    async fn close(&self) -> Result<()> {
        *self.stage.write() = Stage::Closed;
        let mut listeners = self.listeners.lock();
        listeners.attributes.clear();
        listeners.identify.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        matches!(*self.stage.read(), Stage::Closed)
    }
}
