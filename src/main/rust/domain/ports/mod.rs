mod bridged_device;
mod command_sink;
mod device_catalog;
mod device_handle;
mod metrics_reporter;
mod node_sink;
mod protocol_engine;

pub use bridged_device::BridgedDevice;
pub use command_sink::{CommandInvocation, CommandSink};
pub use device_catalog::{BehaviorDescriptor, DeviceCatalog, DeviceTypeDescriptor};
pub use device_handle::{
    AttributeListener, DeviceHandle, IdentifySignal, SignalListener, SubscriptionHandle,
};
pub use metrics_reporter::MetricsReporter;
pub use node_sink::NodeSink;
pub use protocol_engine::{EngineFaultReport, Hub, PairingCodes, ProtocolEngine};
