use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Origin of an attribute change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub local: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
}

impl EventSource {
    pub fn local() -> Self {
        Self {
            local: true,
            src_address: None,
            src_port: None,
        }
    }

    pub fn remote(address: impl Into<String>, port: u16) -> Self {
        Self {
            local: false,
            src_address: Some(address.into()),
            src_port: Some(port),
        }
    }
}

/// Message exchanged with the host runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<EventSource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(payload: Value) -> Self {
        Self {
            topic: None,
            payload,
            event_source: None,
            extra: Map::new(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_event_source(mut self, source: Option<EventSource>) -> Self {
        self.event_source = source;
        self
    }

    /// Tag a message originating on this side with a fresh `_msgid`
    pub fn with_message_id(mut self) -> Self {
        self.extra
            .insert("_msgid".to_string(), Value::String(Uuid::new_v4().to_string()));
        self
    }

    /// Requests a snapshot of every capability
    pub fn is_state_query(&self) -> bool {
        self.topic.as_deref() == Some("state")
    }
}

/// Output wire of a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPort {
    /// Attribute changes, state replies and pass-through echoes
    Events,
    /// Raw command notifications
    Commands,
}
