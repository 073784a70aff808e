//! Device identity and state snapshots.

use serde::{Deserialize, Serialize};

use crate::types::Dim;

/// The last known state of a Deako device, as confirmed by the hub.
///
/// A `DeviceState` is an immutable snapshot: every update from the hub
/// replaces the previous value as a whole.
///
/// # Examples
///
/// ```
/// use deako_rs::{DeviceState, Dim};
///
/// let state = DeviceState::new(true, Dim::create(50));
/// assert!(state.power());
/// assert_eq!(state.dim().map(|d| d.value()), Some(50));
/// assert!(!DeviceState::new(false, None).is_dimmable());
/// ```
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    power: bool,
    #[serde(default)]
    dim: Option<Dim>,
}

impl DeviceState {
    pub fn new(power: bool, dim: Option<Dim>) -> Self {
        DeviceState { power, dim }
    }

    /// Check if the device is switched on.
    pub fn power(&self) -> bool {
        self.power
    }

    /// Get the dim level. `None` means the device is not dimmable.
    pub fn dim(&self) -> Option<Dim> {
        self.dim
    }

    pub fn is_dimmable(&self) -> bool {
        self.dim.is_some()
    }
}

/// A device known to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    uuid: String,
    name: String,
    state: DeviceState,
}

impl Device {
    pub(crate) fn new(uuid: &str, name: &str, state: DeviceState) -> Self {
        Device {
            uuid: uuid.to_string(),
            name: name.to_string(),
            state,
        }
    }

    /// The vendor-assigned, stable identifier.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Display name. Empty until the hub has reported the device during discovery.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub(crate) fn replace_state(&mut self, state: DeviceState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_without_dim() {
        let state: DeviceState = serde_json::from_str(r#"{"power": false}"#).unwrap();
        assert!(!state.power());
        assert!(state.dim().is_none());

        let state: DeviceState = serde_json::from_str(r#"{"power": true, "dim": null}"#).unwrap();
        assert!(state.power());
        assert!(!state.is_dimmable());
    }

    #[test]
    fn test_state_skips_absent_dim() {
        let json = serde_json::to_string(&DeviceState::new(true, None)).unwrap();
        assert_eq!(json, r#"{"power":true}"#);

        let json = serde_json::to_string(&DeviceState::new(false, Dim::create(30))).unwrap();
        assert_eq!(json, r#"{"power":false,"dim":30}"#);
    }

    #[test]
    fn test_replace_state() {
        let mut device = Device::new("A", "Lamp", DeviceState::new(false, None));
        device.replace_state(DeviceState::new(true, Dim::create(10)));
        assert_eq!(device.name(), "Lamp");
        assert_eq!(device.state(), DeviceState::new(true, Dim::create(10)));
    }
}
