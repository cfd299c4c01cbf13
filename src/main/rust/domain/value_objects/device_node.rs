use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Host-side declaration of a device node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNodeConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Id of the bridge the device attaches to
    #[serde(default)]
    pub bridge: Option<String>,
    /// Flow tab owning the node
    #[serde(default, rename = "z")]
    pub flow: Option<String>,
    /// Disabled node
    #[serde(default, rename = "d")]
    pub disabled: bool,
    #[serde(default)]
    pub device_config: Value,
    #[serde(default, deserialize_with = "flag")]
    pub auto_confirm: bool,
    #[serde(default, deserialize_with = "flag")]
    pub passthrough: bool,
}

impl DeviceNodeConfig {
    pub fn new(id: impl Into<String>, bridge: Option<&str>, device_config: Value) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            bridge: bridge.map(str::to_string),
            flow: None,
            disabled: false,
            device_config,
            auto_confirm: false,
            passthrough: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_auto_confirm(mut self, enabled: bool) -> Self {
        self.auto_confirm = enabled;
        self
    }

    pub fn with_passthrough(mut self, enabled: bool) -> Self {
        self.passthrough = enabled;
        self
    }
}

/// Host flags arrive as booleans or as "true"/"false" strings
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}
