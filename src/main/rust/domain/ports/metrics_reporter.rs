use crate::domain::value_objects::{BridgeState, DeviceState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_bridge_state(&self, bridge_id: &str, state: BridgeState);
    fn report_device_transition(&self, from: Option<DeviceState>, to: DeviceState);
    fn report_engine_fault(&self, matched: bool);
    fn report_command(&self, cluster: &str, command: &str);
    fn report_attribute_event(&self);
    fn report_update_failure(&self);
}
