pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    BridgeController, CommissioningInfo, DeviceController, DeviceRegistrationFactory,
    DeviceRegistry, EventSubscriptionManager, RegistrationOutcome,
};
pub use config::Config;
pub use domain::entities::{DeviceLifecycle, StateTransition};
pub use domain::errors::{DomainError, Result};
pub use domain::ports::{BridgedDevice, DeviceHandle, Hub, MetricsReporter, NodeSink, ProtocolEngine};
pub use domain::value_objects::{
    BridgeConfig, BridgeState, DeviceConfig, DeviceNodeConfig, DeviceState, Message, NodeStatus,
    OutputPort, SettlePolicy,
};
pub use infrastructure::engine::InMemoryEngine;
pub use infrastructure::host::{BridgeDirectory, ChannelSink, Fleet, HostEvent, RecordingSink};
pub use infrastructure::http::{routes, serve_admin};
pub use infrastructure::metrics::PrometheusReporter;
