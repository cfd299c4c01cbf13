use std::fmt;

/// Lifecycle states of a bridged device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Configuration not parsed yet
    Unconfigured,
    /// Waiting for the bridge to own a live hub
    AwaitingBridge,
    /// Registered, waiting for the readiness broadcast
    AwaitingServerReady,
    /// Readiness received, settling and subscribing
    SubscribingEvents,
    /// Fully operational
    Ready,
    /// Declarative configuration could not be parsed
    ConfigError,
    /// Construction, registration or engine validation failed
    ValidationFailed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "UNCONFIGURED"),
            Self::AwaitingBridge => write!(f, "AWAITING_BRIDGE"),
            Self::AwaitingServerReady => write!(f, "AWAITING_SERVER_READY"),
            Self::SubscribingEvents => write!(f, "SUBSCRIBING_EVENTS"),
            Self::Ready => write!(f, "READY"),
            Self::ConfigError => write!(f, "CONFIG_ERROR"),
            Self::ValidationFailed => write!(f, "VALIDATION_FAILED"),
        }
    }
}

impl DeviceState {
    pub const ALL: [DeviceState; 7] = [
        Self::Unconfigured,
        Self::AwaitingBridge,
        Self::AwaitingServerReady,
        Self::SubscribingEvents,
        Self::Ready,
        Self::ConfigError,
        Self::ValidationFailed,
    ];

    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Unconfigured => 0.0,
            Self::AwaitingBridge => 1.0,
            Self::AwaitingServerReady => 2.0,
            Self::SubscribingEvents => 3.0,
            Self::Ready => 4.0,
            Self::ConfigError => 5.0,
            Self::ValidationFailed => 6.0,
        }
    }

    /// Label used for the devices-by-state gauge
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::AwaitingBridge => "awaiting_bridge",
            Self::AwaitingServerReady => "awaiting_server_ready",
            Self::SubscribingEvents => "subscribing_events",
            Self::Ready => "ready",
            Self::ConfigError => "config_error",
            Self::ValidationFailed => "validation_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConfigError | Self::ValidationFailed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::Unconfigured
    }
}
