use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::ports::DeviceHandle;
use crate::domain::value_objects::NodeStatus;

/// What a bridge needs from a registered device
pub trait BridgedDevice: Send + Sync {
    fn node_id(&self) -> &str;

    fn protocol_id(&self) -> &str;

    fn handle(&self) -> Option<Arc<dyn DeviceHandle>>;

    /// Set once any terminal failure was recorded
    fn is_init_failed(&self) -> bool;

    /// Terminal failure raised by the bridge side
    fn on_failure(&self, error: DomainError, status: NodeStatus);

    /// Readiness broadcast; must return without waiting
    fn on_server_ready(&self);
}
