use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::ports::NodeSink;
use crate::domain::value_objects::{Message, NodeStatus, OutputPort};

/// What a device node hands to the host runtime
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostEvent {
    Output {
        device: String,
        port: OutputPort,
        message: Message,
    },
    Status {
        device: String,
        status: NodeStatus,
    },
}

/// Forwards one device's outputs and statuses to the host channel
pub struct ChannelSink {
    device: String,
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelSink {
    pub fn new(device: impl Into<String>, tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            device: device.into(),
            tx,
        }
    }

    fn forward(&self, event: HostEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(device = %self.device, "Host channel closed, dropping event");
        }
    }
}

impl NodeSink for ChannelSink {
    fn send(&self, port: OutputPort, message: Message) {
        self.forward(HostEvent::Output {
            device: self.device.clone(),
            port,
            message,
        });
    }

    fn status(&self, status: NodeStatus) {
        self.forward(HostEvent::Status {
            device: self.device.clone(),
            status,
        });
    }
}

/// Keeps everything a device emitted
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(OutputPort, Message)>>,
    statuses: Mutex<Vec<NodeStatus>>,
}

impl RecordingSink {
    pub fn messages(&self, port: OutputPort) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.statuses.lock().clone()
    }

    pub fn last_status(&self) -> Option<NodeStatus> {
        self.statuses.lock().last().cloned()
    }
}

impl NodeSink for RecordingSink {
    fn send(&self, port: OutputPort, message: Message) {
        self.messages.lock().push((port, message));
    }

    fn status(&self, status: NodeStatus) {
        self.statuses.lock().push(status);
    }
}
