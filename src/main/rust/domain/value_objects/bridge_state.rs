use std::fmt;

/// Lifecycle of the shared hub owned by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No hub yet, or hub creation failed
    Uninitialized,
    /// Engine environment and hub are being built
    Creating,
    /// Hub exists but has not been started
    Ready,
    /// Hub started and reachable
    Online,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Creating => write!(f, "CREATING"),
            Self::Ready => write!(f, "READY"),
            Self::Online => write!(f, "ONLINE"),
        }
    }
}

impl BridgeState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Uninitialized => 0.0,
            Self::Creating => 1.0,
            Self::Ready => 2.0,
            Self::Online => 3.0,
        }
    }

    /// Whether the bridge owns a live hub instance
    pub fn has_hub(&self) -> bool {
        matches!(self, Self::Ready | Self::Online)
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::Uninitialized
    }
}
