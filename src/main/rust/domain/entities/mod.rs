mod device_lifecycle;

pub use device_lifecycle::{DeviceLifecycle, StateTransition};
