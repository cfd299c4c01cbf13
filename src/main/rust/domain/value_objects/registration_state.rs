use serde::Serialize;

/// Outcome of adding a device to the hub aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationState {
    Pending,
    Registered,
    AddFailed,
    ValidationFailed,
}

impl RegistrationState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::AddFailed | Self::ValidationFailed)
    }
}
