use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("Invalid device configuration: {0}")]
    ConfigError(String),

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("Unknown feature {feature} for behavior {behavior}")]
    UnknownFeature { behavior: String, feature: String },

    #[error("Device not initialized: {0}")]
    DeviceNotInitialized(String),

    #[error("Registration conflict: {0}")]
    RegistrationConflict(String),

    #[error("Engine fault on device {device}: {reason}")]
    EngineFault { device: String, reason: String },

    #[error("State update failed: {0}")]
    UpdateFailed(String),

    #[error("Device validation failed: {0}")]
    ValidationFailed(String),

    #[error("No bridge configured")]
    NoBridge,

    #[error("Bridge not ready: {0}")]
    BridgeNotReady(String),

    #[error("Hub creation failed: {0}")]
    HubCreationFailed(String),

    #[error("Hub start failed: {0}")]
    HubStartFailed(String),

    #[error("Invalid port: port cannot be zero")]
    InvalidPort,

    #[error("Invalid passcode: {0}")]
    InvalidPasscode(u32),

    #[error("Invalid discriminator: {0} (must be 0..=4095)")]
    InvalidDiscriminator(u16),

    #[error("Invalid settle interval: {0} must be > 0")]
    InvalidSettleInterval(&'static str),
}

impl DomainError {
    /// Faults that end a device's participation in the bridge
    pub fn is_fatal_to_device(&self) -> bool {
        !matches!(
            self,
            Self::RegistrationConflict(_)
                | Self::UpdateFailed(_)
                | Self::UnknownBehavior(_)
                | Self::UnknownFeature { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
