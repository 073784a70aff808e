//! Per-device state change notifications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use log::{debug, trace};

use crate::errors::Error;

/// Receives "this device changed" notifications.
///
/// Notifications carry no payload; the listener re-queries the client for
/// the current state. Listeners run on the connection's receive task and must
/// return quickly. Hosts with slow or async handlers should use a
/// [`ForwardingListener`] and process notifications elsewhere.
pub trait StateListener: Send + Sync + 'static {
    fn state_changed(&self, uuid: &str);
}

impl<F> StateListener for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn state_changed(&self, uuid: &str) {
        self(uuid)
    }
}

/// Hands notifications off to an unbounded channel.
///
/// # Example
///
/// ```
/// use deako_rs::ForwardingListener;
///
/// let (listener, mut changes) = ForwardingListener::channel();
/// # drop(listener);
/// # let _ = changes.try_recv();
/// ```
#[derive(Debug, Clone)]
pub struct ForwardingListener {
    tx: UnboundedSender<String>,
}

impl ForwardingListener {
    /// Create a listener and the stream of device uuids it forwards to.
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded();
        (ForwardingListener { tx }, rx)
    }
}

impl StateListener for ForwardingListener {
    fn state_changed(&self, uuid: &str) {
        if self.tx.unbounded_send(uuid.to_string()).is_err() {
            trace!("state change for {uuid} dropped; receiver closed");
        }
    }
}

/// Invoked once when an established session ends.
pub type DisconnectCallback = Arc<dyn Fn(&Error) + Send + Sync + 'static>;

/// Holds at most one [`StateListener`] per device uuid.
#[derive(Default)]
pub struct CallbackDispatcher {
    listeners: Mutex<HashMap<String, Arc<dyn StateListener>>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener for `uuid`, replacing any previous one.
    ///
    /// Returns `true` if a listener was replaced.
    pub fn register<L: StateListener>(&self, uuid: &str, listener: L) -> bool {
        let replaced = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.to_string(), Arc::new(listener))
            .is_some();
        debug!("state listener for {uuid} registered (replaced: {replaced})");
        replaced
    }

    pub fn unregister(&self, uuid: &str) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uuid)
            .is_some()
    }

    pub fn is_registered(&self, uuid: &str) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify the listener for `uuid`, if any.
    pub fn notify(&self, uuid: &str) {
        // Released before the call so a listener may re-register itself.
        let listener = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uuid)
            .cloned();

        match listener {
            Some(listener) => listener.state_changed(uuid),
            None => trace!("no state listener for {uuid}"),
        }
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("listeners", &self.len())
            .finish()
    }
}
