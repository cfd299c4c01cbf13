use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::domain::value_objects::SettlePolicy;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "matter-dynamic-bridge",
    version = "0.1.0",
    about = "Dynamic bridge exposing declaratively configured devices through a shared hub"
)]
pub struct Config {
    /// Fleet file declaring bridges, devices and flow tabs
    #[arg(long, env = "FLEET_FILE", default_value = "fleet.json")]
    pub fleet: PathBuf,

    /// Admin, health and metrics server port
    #[arg(long, env = "ADMIN_PORT", default_value = "1880")]
    pub admin_port: u16,

    /// Interval between bridge readiness polls in milliseconds
    #[arg(long, env = "BRIDGE_POLL_INTERVAL_MS", default_value = "100")]
    pub poll_interval_ms: u64,

    /// Fallback wait after hub start in milliseconds
    #[arg(long, env = "HUB_SETTLE_MS", default_value = "3000")]
    pub hub_settle_ms: u64,

    /// Fallback wait before subscribing device events in milliseconds
    #[arg(long, env = "SUBSCRIPTION_SETTLE_MS", default_value = "2000")]
    pub subscription_settle_ms: u64,

    /// Delay before auto-confirming a command in milliseconds
    #[arg(long, env = "AUTO_CONFIRM_DELAY_MS", default_value = "50")]
    pub auto_confirm_delay_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.admin_port, "admin")?;

        if self.poll_interval_ms == 0 {
            anyhow::bail!("Bridge poll interval cannot be 0");
        }

        if self.fleet.as_os_str().is_empty() {
            anyhow::bail!("Fleet file path cannot be empty");
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn to_settle_policy(&self) -> crate::domain::errors::Result<SettlePolicy> {
        SettlePolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.hub_settle_ms),
            Duration::from_millis(self.subscription_settle_ms),
            Duration::from_millis(self.auto_confirm_delay_ms),
        )
    }
}
