mod bridge_controller;
mod command_relay;
mod device_controller;
mod device_registry;
mod event_subscriptions;
mod fault_interceptor;
mod registration_factory;

pub use bridge_controller::{BridgeController, CommissioningInfo};
pub use command_relay::{CommandRelay, HandleSource};
pub use device_controller::DeviceController;
pub use device_registry::{DeviceRegistry, RecordSummary, RegistrationOutcome};
pub use event_subscriptions::EventSubscriptionManager;
pub use fault_interceptor::{parse_fault, DeviceFault, FaultInterceptor};
pub use registration_factory::{BuiltDevice, DeviceRegistrationFactory};
