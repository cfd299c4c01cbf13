use crate::domain::value_objects::{Message, NodeStatus, OutputPort};

/// Host runtime side of a device node
pub trait NodeSink: Send + Sync {
    fn send(&self, port: OutputPort, message: Message);
    fn status(&self, status: NodeStatus);
}
