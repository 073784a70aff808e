//! In-memory view of every device the hub has reported.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::device::{Device, DeviceState};
use crate::dispatch::{CallbackDispatcher, StateListener};
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Authoritative mapping from device uuid to [`Device`].
///
/// Entries are only ever added or updated, never removed. Readers always see
/// a whole [`Device`]; every mutation replaces records under the write lock.
/// State updates notify the device's listener once the lock is released.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    callbacks: CallbackDispatcher,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device reported during discovery.
    ///
    /// Discovery is an initial sync, not a change: no listener is notified.
    pub fn apply_discovery(&self, uuid: &str, name: &str, state: DeviceState) {
        let previous = self
            .write()
            .insert(uuid.to_string(), Device::new(uuid, name, state));
        if previous.is_none() {
            debug!("discovered device {uuid} ({name})");
        }
    }

    /// Replace the state of `uuid` and notify its listener.
    ///
    /// A push for an unknown device creates a record with an empty name.
    /// Listeners fire on every update, even when the state is unchanged.
    pub fn apply_state_update(&self, uuid: &str, state: DeviceState) {
        {
            let mut devices = self.write();
            match devices.get_mut(uuid) {
                Some(device) => device.replace_state(state),
                None => {
                    debug!("state update for unseen device {uuid}");
                    devices.insert(uuid.to_string(), Device::new(uuid, "", state));
                }
            }
        }
        self.callbacks.notify(uuid);
    }

    pub fn get(&self, uuid: &str) -> Result<Device> {
        self.read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(uuid.to_string()))
    }

    pub fn state(&self, uuid: &str) -> Result<DeviceState> {
        self.read()
            .get(uuid)
            .map(Device::state)
            .ok_or_else(|| Error::DeviceNotFound(uuid.to_string()))
    }

    pub fn name(&self, uuid: &str) -> Result<String> {
        self.read()
            .get(uuid)
            .map(|d| d.name().to_string())
            .ok_or_else(|| Error::DeviceNotFound(uuid.to_string()))
    }

    /// Snapshot of every known device uuid.
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of every known device.
    pub fn snapshot(&self) -> Vec<Device> {
        self.read().values().cloned().collect()
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.read().contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register the single state listener for `uuid`.
    pub fn set_listener<L: StateListener>(&self, uuid: &str, listener: L) -> bool {
        self.callbacks.register(uuid, listener)
    }

    pub fn remove_listener(&self, uuid: &str) -> bool {
        self.callbacks.unregister(uuid)
    }

    pub fn has_listener(&self, uuid: &str) -> bool {
        self.callbacks.is_registered(uuid)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Device>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Device>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dim;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn on(dim: u8) -> DeviceState {
        DeviceState::new(true, Dim::create(dim))
    }

    #[test]
    fn test_last_write_wins_and_notifies_each_update() {
        let registry = DeviceRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        registry.set_listener("A", move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.apply_state_update("A", on(20));
        registry.apply_state_update("A", on(20));
        registry.apply_state_update("A", on(60));

        assert_eq!(registry.state("A").unwrap(), on(60));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_replaced_listener_only_new_fires() {
        let registry = DeviceRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (f1, f2) = (Arc::clone(&first), Arc::clone(&second));

        registry.set_listener("A", move |_: &str| {
            f1.fetch_add(1, Ordering::SeqCst);
        });
        registry.set_listener("A", move |_: &str| {
            f2.fetch_add(1, Ordering::SeqCst);
        });
        registry.apply_state_update("A", on(10));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_device_not_found() {
        let registry = DeviceRegistry::new();
        assert_eq!(
            registry.get("missing").unwrap_err(),
            Error::DeviceNotFound("missing".into())
        );
        assert!(registry.state("missing").unwrap_err().is_not_found());
        assert!(registry.name("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_discovery_does_not_notify() {
        let registry = DeviceRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        registry.set_listener("A", move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.apply_discovery("A", "Lamp", DeviceState::new(false, None));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.name("A").unwrap(), "Lamp");
    }

    #[test]
    fn test_push_before_discovery_creates_placeholder() {
        let registry = DeviceRegistry::new();
        registry.apply_state_update("A", on(40));

        let device = registry.get("A").unwrap();
        assert_eq!(device.name(), "");
        assert_eq!(device.state(), on(40));

        registry.apply_discovery("A", "Lamp", on(45));
        assert_eq!(registry.name("A").unwrap(), "Lamp");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_keeps_name() {
        let registry = DeviceRegistry::new();
        registry.apply_discovery("B", "Strip", on(50));
        registry.apply_state_update("B", DeviceState::new(false, Dim::create(50)));
        assert_eq!(registry.name("B").unwrap(), "Strip");
        assert!(!registry.state("B").unwrap().power());
    }

    #[test]
    fn test_list_is_a_snapshot() {
        let registry = DeviceRegistry::new();
        registry.apply_discovery("A", "Lamp", DeviceState::new(false, None));
        let listed = registry.list();
        registry.apply_discovery("B", "Strip", on(50));

        assert_eq!(listed, vec!["A".to_string()]);
        let mut all = registry.list();
        all.sort();
        assert_eq!(all, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_listener_may_query_registry() {
        let registry = Arc::new(DeviceRegistry::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let (r, s) = (Arc::clone(&registry), Arc::clone(&seen));
        registry.set_listener("A", move |uuid: &str| {
            let state = r.state(uuid).unwrap();
            s.store(state.dim().map_or(0, |d| d.value() as usize), Ordering::SeqCst);
        });

        registry.apply_state_update("A", on(70));
        assert_eq!(seen.load(Ordering::SeqCst), 70);
    }
}
