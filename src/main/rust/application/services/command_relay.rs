use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::domain::ports::{
    CommandInvocation, CommandSink, DeviceHandle, MetricsReporter, NodeSink,
};
use crate::domain::value_objects::{Message, OutputPort};

/// Source of the device handle a relay confirms against
pub trait HandleSource: Send + Sync {
    fn current_handle(&self) -> Option<Arc<dyn DeviceHandle>>;
}

/// Forwards device commands to the host and optionally confirms them
pub struct CommandRelay {
    device_id: String,
    sink: Arc<dyn NodeSink>,
    metrics: Arc<dyn MetricsReporter>,
    handles: Weak<dyn HandleSource>,
    auto_confirm: bool,
    confirm_delay: Duration,
}

impl CommandRelay {
    pub fn new(
        device_id: impl Into<String>,
        sink: Arc<dyn NodeSink>,
        metrics: Arc<dyn MetricsReporter>,
        handles: Weak<dyn HandleSource>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            sink,
            metrics,
            handles,
            auto_confirm: false,
            confirm_delay: Duration::from_millis(50),
        }
    }

    pub fn with_auto_confirm(mut self, enabled: bool, delay: Duration) -> Self {
        self.auto_confirm = enabled;
        self.confirm_delay = delay;
        self
    }

    /// State patch a real device would report after the command
    pub fn confirmation_patch(
        cluster: &str,
        command: &str,
        data: &Value,
        current: Option<&Map<String, Value>>,
    ) -> Option<Map<String, Value>> {
        let (key, value) = match (cluster, command) {
            ("OnOff", "on") => ("onOff", json!({"onOff": true})),
            ("OnOff", "off") => ("onOff", json!({"onOff": false})),
            ("OnOff", "toggle") => {
                let on = current?.get("onOff")?.get("onOff")?.as_bool()?;
                ("onOff", json!({"onOff": !on}))
            }
            ("LevelControl", "moveToLevel" | "moveToLevelWithOnOff") => {
                ("levelControl", json!({"currentLevel": data.get("level")?}))
            }
            ("DoorLock", "lockDoor") => ("doorLock", json!({"lockState": 1})),
            ("DoorLock", "unlockDoor" | "unlockWithTimeout") => {
                ("doorLock", json!({"lockState": 2}))
            }
            _ => return None,
        };
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        Some(patch)
    }

    fn schedule_confirmation(&self, invocation: &CommandInvocation) {
        let Some(handle) = self.handles.upgrade().and_then(|h| h.current_handle()) else {
            return;
        };
        let current = handle.state_snapshot().ok();
        let Some(patch) = Self::confirmation_patch(
            &invocation.cluster,
            &invocation.command,
            &invocation.data,
            current.as_ref(),
        ) else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(device = %self.device_id, "No runtime, skipping auto-confirm");
            return;
        };
        let device_id = self.device_id.clone();
        let command = invocation.command.clone();
        let delay = self.confirm_delay;
        let handles = self.handles.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Device closed in the meantime
            let Some(handle) = handles.upgrade().and_then(|h| h.current_handle()) else {
                return;
            };
            if handle.is_closed() {
                return;
            }
            info!(device = %device_id, command = %command, "Auto-confirming command");
            if let Err(e) = handle.set_state(patch).await {
                error!(device = %device_id, error = %e, "Failed to auto-confirm");
            }
        });
    }
}

impl CommandSink for CommandRelay {
    fn on_command(&self, invocation: &CommandInvocation) {
        self.metrics
            .report_command(&invocation.cluster, &invocation.command);
        self.sink.send(
            OutputPort::Commands,
            Message::new(json!({
                "command": invocation.command,
                "cluster": invocation.cluster,
                "data": invocation.data,
            }))
            .with_message_id(),
        );

        if self.auto_confirm {
            self.schedule_confirmation(invocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_off_patches() {
        let on = CommandRelay::confirmation_patch("OnOff", "on", &Value::Null, None).unwrap();
        assert_eq!(Value::Object(on), json!({"onOff": {"onOff": true}}));
        let off = CommandRelay::confirmation_patch("OnOff", "off", &Value::Null, None).unwrap();
        assert_eq!(Value::Object(off), json!({"onOff": {"onOff": false}}));
    }

    #[test]
    fn test_toggle_needs_current_state() {
        assert!(CommandRelay::confirmation_patch("OnOff", "toggle", &Value::Null, None).is_none());
        let current = json!({"onOff": {"onOff": true}}).as_object().unwrap().clone();
        let patch =
            CommandRelay::confirmation_patch("OnOff", "toggle", &Value::Null, Some(&current))
                .unwrap();
        assert_eq!(Value::Object(patch), json!({"onOff": {"onOff": false}}));
    }

    #[test]
    fn test_level_and_lock_patches() {
        let level = CommandRelay::confirmation_patch(
            "LevelControl",
            "moveToLevel",
            &json!({"level": 120, "transitionTime": 0}),
            None,
        )
        .unwrap();
        assert_eq!(Value::Object(level), json!({"levelControl": {"currentLevel": 120}}));

        let unlock = CommandRelay::confirmation_patch("DoorLock", "unlockDoor", &json!({}), None)
            .unwrap();
        assert_eq!(Value::Object(unlock), json!({"doorLock": {"lockState": 2}}));
    }

    #[test]
    fn test_unrelated_commands_have_no_patch() {
        assert!(CommandRelay::confirmation_patch("Groups", "addGroup", &json!({}), None).is_none());
    }
}
