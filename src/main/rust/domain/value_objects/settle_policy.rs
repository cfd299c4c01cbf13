use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Timing used while waiting on the bridge and on deferred engine validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlePolicy {
    bridge_poll_interval: Duration,
    hub_settle: Duration,
    subscription_settle: Duration,
    auto_confirm_delay: Duration,
}

impl SettlePolicy {
    pub fn new(
        bridge_poll_interval: Duration,
        hub_settle: Duration,
        subscription_settle: Duration,
        auto_confirm_delay: Duration,
    ) -> Result<Self> {
        if bridge_poll_interval.is_zero() {
            return Err(DomainError::InvalidSettleInterval("bridge poll interval"));
        }

        Ok(Self {
            bridge_poll_interval,
            hub_settle,
            subscription_settle,
            auto_confirm_delay,
        })
    }

    /// Interval between checks for a live hub
    pub fn bridge_poll_interval(&self) -> Duration {
        self.bridge_poll_interval
    }

    /// Fallback wait after hub start when the engine has no settle signal
    pub fn hub_settle(&self) -> Duration {
        self.hub_settle
    }

    /// Fallback wait between readiness and subscription
    pub fn subscription_settle(&self) -> Duration {
        self.subscription_settle
    }

    pub fn auto_confirm_delay(&self) -> Duration {
        self.auto_confirm_delay
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            bridge_poll_interval: Duration::from_millis(100),
            hub_settle: Duration::from_millis(3000),
            subscription_settle: Duration::from_millis(2000),
            auto_confirm_delay: Duration::from_millis(50),
        }
    }
}
