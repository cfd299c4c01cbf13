use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::Result;
use crate::domain::value_objects::EventSource;

/// Callback fired with the new value of an attribute
pub type AttributeListener = Arc<dyn Fn(Value, Option<EventSource>) + Send + Sync>;

/// Callback fired on an identify start or stop signal
pub type SignalListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifySignal {
    Start,
    Stop,
}

/// Token returned by a subscription, needed to remove it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionHandle {
    Attribute {
        capability: String,
        attribute: String,
        listener_id: u64,
    },
    Identify {
        signal: IdentifySignal,
        listener_id: u64,
    },
}

/// Capability descriptor over an engine-native device
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    fn protocol_id(&self) -> &str;

    /// Live state and event views are both present
    fn is_structurally_complete(&self) -> bool;

    /// State keys of every capability the device exposes
    fn capabilities(&self) -> Vec<String>;

    /// Attributes of a capability that emit change signals
    fn observable_attributes(&self, capability: &str) -> Vec<String>;

    fn supports_identify(&self) -> bool;

    fn subscribe_attribute(
        &self,
        capability: &str,
        attribute: &str,
        listener: AttributeListener,
    ) -> Result<SubscriptionHandle>;

    fn subscribe_identify(
        &self,
        signal: IdentifySignal,
        listener: SignalListener,
    ) -> Result<SubscriptionHandle>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;

    /// Copy of every capability's current attributes
    fn state_snapshot(&self) -> Result<Map<String, Value>>;

    /// Apply a partial attribute tree
    async fn set_state(&self, patch: Map<String, Value>) -> Result<()>;

    /// Resolves once deferred validation is done, or after `fallback`
    async fn settled(&self, fallback: Duration);

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
