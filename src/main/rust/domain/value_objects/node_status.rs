use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Red,
    Green,
    Yellow,
    Blue,
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    Dot,
    Ring,
}

/// Operator-visible status badge of a device node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub fill: StatusFill,
    pub shape: StatusShape,
    pub text: String,
}

impl NodeStatus {
    fn fault(text: &str) -> Self {
        Self {
            fill: StatusFill::Red,
            shape: StatusShape::Ring,
            text: text.to_string(),
        }
    }

    pub fn not_running() -> Self {
        Self::fault("not running")
    }

    pub fn no_bridge() -> Self {
        Self::fault("no bridge")
    }

    pub fn error() -> Self {
        Self::fault("error")
    }

    pub fn init_failed() -> Self {
        Self::fault("init failed")
    }

    pub fn validation_error() -> Self {
        Self::fault("validation error")
    }

    pub fn validation_failed() -> Self {
        Self::fault("validation failed")
    }

    pub fn ready() -> Self {
        Self {
            fill: StatusFill::Green,
            shape: StatusShape::Dot,
            text: "ready".to_string(),
        }
    }

    pub fn identify() -> Self {
        Self {
            fill: StatusFill::Blue,
            shape: StatusShape::Dot,
            text: "identify".to_string(),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.fill == StatusFill::Red
    }
}
