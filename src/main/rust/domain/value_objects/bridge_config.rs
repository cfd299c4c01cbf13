use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::{Discriminator, Passcode};

pub const DEFAULT_BRIDGE_NAME: &str = "Matter Bridge";
pub const DEFAULT_VENDOR_ID: u16 = 0xFFF1;
pub const DEFAULT_PRODUCT_ID: u16 = 0x8000;
pub const DEFAULT_VENDOR_NAME: &str = "Node-RED";
pub const DEFAULT_PRODUCT_NAME: &str = "Dynamic Matter Bridge";
pub const DEFAULT_HUB_PORT: u16 = 5540;

/// Verbosity requested for the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Fatal | Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FATAL" => Ok(Self::Fatal),
            "ERROR" => Ok(Self::Error),
            "WARN" => Ok(Self::Warn),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            other => Err(DomainError::ConfigError(format!("unknown log level {}", other))),
        }
    }
}

/// Configuration of one bridge hub
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    id: String,
    name: String,
    vendor_id: u16,
    product_id: u16,
    vendor_name: String,
    product_name: String,
    network_interface: Option<String>,
    storage_location: Option<PathBuf>,
    port: u16,
    log_level: LogLevel,
    passcode: Passcode,
    discriminator: Discriminator,
}

impl BridgeConfig {
    /// Defaults plus a freshly generated passcode and discriminator
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: DEFAULT_BRIDGE_NAME.to_string(),
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            vendor_name: DEFAULT_VENDOR_NAME.to_string(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            network_interface: None,
            storage_location: None,
            port: DEFAULT_HUB_PORT,
            log_level: LogLevel::default(),
            passcode: Passcode::generate(),
            discriminator: Discriminator::generate(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_vendor(mut self, vendor_id: u16, vendor_name: impl Into<String>) -> Self {
        self.vendor_id = vendor_id;
        self.vendor_name = vendor_name.into();
        self
    }

    pub fn with_product(mut self, product_id: u16, product_name: impl Into<String>) -> Self {
        self.product_id = product_id;
        self.product_name = product_name.into();
        self
    }

    pub fn with_network_interface(mut self, interface: Option<String>) -> Self {
        self.network_interface = interface.filter(|name| !name.is_empty());
        self
    }

    pub fn with_storage_location(mut self, location: Option<PathBuf>) -> Self {
        self.storage_location = location;
        self
    }

    pub fn with_port(mut self, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(DomainError::InvalidPort);
        }
        self.port = port;
        Ok(self)
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Pin commissioning credentials instead of the generated ones
    pub fn with_commissioning(mut self, passcode: Passcode, discriminator: Discriminator) -> Self {
        self.passcode = passcode;
        self.discriminator = discriminator;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn vendor_name(&self) -> &str {
        &self.vendor_name
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn network_interface(&self) -> Option<&str> {
        self.network_interface.as_deref()
    }

    pub fn storage_location(&self) -> Option<&PathBuf> {
        self.storage_location.as_ref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn passcode(&self) -> Passcode {
        self.passcode
    }

    pub fn discriminator(&self) -> Discriminator {
        self.discriminator
    }

    /// Serial number reported by the hub: the bridge id without hyphens
    pub fn serial_number(&self) -> String {
        self.id.replace('-', "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::new("b-1");
        assert_eq!(config.name(), "Matter Bridge");
        assert_eq!(config.vendor_id(), 65521);
        assert_eq!(config.product_id(), 32768);
        assert_eq!(config.vendor_name(), "Node-RED");
        assert_eq!(config.product_name(), "Dynamic Matter Bridge");
        assert_eq!(config.port(), 5540);
        assert_eq!(config.log_level(), LogLevel::Info);
        assert!(config.network_interface().is_none());
    }

    #[test]
    fn test_rejects_zero_port() {
        assert_eq!(
            BridgeConfig::new("b").with_port(0).unwrap_err(),
            DomainError::InvalidPort
        );
    }

    #[test]
    fn test_empty_interface_means_all() {
        let config = BridgeConfig::new("b").with_network_interface(Some(String::new()));
        assert!(config.network_interface().is_none());
    }

    #[test]
    fn test_serial_number_strips_hyphens() {
        assert_eq!(BridgeConfig::new("a1-b2-c3").serial_number(), "a1b2c3");
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Fatal.to_string(), "FATAL");
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
