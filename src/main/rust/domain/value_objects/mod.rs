mod bridge_config;
mod bridge_state;
mod commissioning;
mod device_blueprint;
mod device_config;
mod device_identity;
mod device_node;
mod device_state;
mod message;
mod node_status;
mod registration_state;
mod settle_policy;

pub use bridge_config::{
    BridgeConfig, LogLevel, DEFAULT_BRIDGE_NAME, DEFAULT_HUB_PORT, DEFAULT_PRODUCT_ID,
    DEFAULT_PRODUCT_NAME, DEFAULT_VENDOR_ID, DEFAULT_VENDOR_NAME,
};
pub use bridge_state::BridgeState;
pub use commissioning::{Discriminator, Passcode};
pub use device_blueprint::{BehaviorSpec, DeviceBlueprint};
pub use device_config::DeviceConfig;
pub use device_identity::DeviceIdentity;
pub use device_node::DeviceNodeConfig;
pub use device_state::DeviceState;
pub use message::{EventSource, Message, OutputPort};
pub use node_status::{NodeStatus, StatusFill, StatusShape};
pub use registration_state::RegistrationState;
pub use settle_policy::SettlePolicy;
