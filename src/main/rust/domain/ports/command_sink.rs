use serde_json::{json, Value};

/// A command received by a device from a protocol peer
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    pub cluster: String,
    pub command: String,
    pub data: Value,
    /// Whether the command definition has a response payload
    pub expects_response: bool,
}

/// Receives every command before the engine's own handler runs
pub trait CommandSink: Send + Sync {
    fn on_command(&self, invocation: &CommandInvocation);

    /// Response given for commands the engine does not implement
    fn unimplemented_response(&self, invocation: &CommandInvocation) -> Option<Value> {
        if invocation.expects_response {
            Some(json!({ "status": 0 }))
        } else {
            None
        }
    }
}
