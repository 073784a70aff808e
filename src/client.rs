//! The session controller used by host applications.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::codec::{Frame, Request, encode_line};
use crate::config::ClientConfig;
use crate::device::{Device, DeviceState};
use crate::discovery::Discovery;
use crate::dispatch::{DisconnectCallback, StateListener};
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::registry::DeviceRegistry;
use crate::runtime::{self, Mutex};
use crate::transport::{ConnectionState, FrameHandler, Transport, TransportOptions};
use crate::types::Dim;

type Result<T> = std::result::Result<T, Error>;

/// A connection to one Deako hub and the devices it reports.
///
/// The client keeps a live registry of every device the hub has reported.
/// Queries answer from that registry without touching the network; control
/// commands are sent to the hub and the registry only changes once the hub
/// confirms the new state.
///
/// # Example
///
/// ```no_run
/// use deako_rs::Client;
///
/// # async fn run() -> Result<(), deako_rs::Error> {
/// let client = Client::new("192.168.1.50", "My App");
/// client.connect().await?;
/// for uuid in client.discover_devices().await? {
///     println!("{} is on: {}", client.name_for(&uuid)?, client.state_for(&uuid)?.power());
///     client.set_state_callback(&uuid, |uuid: &str| println!("{uuid} changed"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    session: Arc<Session>,
    transport: Transport,
    history: Arc<Mutex<MessageHistory>>,
}

/// State shared with the receive loop.
struct Session {
    registry: DeviceRegistry,
    discovery: StdMutex<Discovery>,
    on_disconnect: StdMutex<Option<DisconnectCallback>>,
}

impl FrameHandler for Session {
    fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::DeviceList { count } => lock(&self.discovery).expect(count),
            Frame::DeviceFound { uuid, name, state } => {
                self.registry.apply_discovery(&uuid, &name, state);
                lock(&self.discovery).record(&uuid);
            }
            Frame::StateChanged { uuid, state } | Frame::ControlAck { uuid, state } => {
                self.registry.apply_state_update(&uuid, state)
            }
            Frame::Other { kind } => debug!("ignoring {kind} frame"),
        }
    }

    fn handle_disconnect(&self, reason: &Error) {
        lock(&self.discovery).fail(reason);
        let callback = lock(&self.on_disconnect).clone();
        if let Some(callback) = callback {
            callback(reason);
        }
    }
}

impl Client {
    /// Create a client for the hub at `address`, identifying as `client_name`.
    ///
    /// No connection is made until [`Client::connect`] is called.
    pub fn new(address: &str, client_name: &str) -> Self {
        Self::with_config(ClientConfig::new(address, client_name))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let session = Arc::new(Session {
            registry: DeviceRegistry::new(),
            discovery: StdMutex::new(Discovery::new()),
            on_disconnect: StdMutex::new(None),
        });
        let history = Arc::new(Mutex::new(MessageHistory::with_max_entries(
            config.history_size,
        )));
        let options = TransportOptions {
            address: config.socket_address(),
            connect_timeout: config.connect_timeout(),
            read_buffer_size: config.read_buffer_size,
            max_frame_len: config.max_frame_len,
        };
        let handler: Arc<dyn FrameHandler> = session.clone();
        let transport = Transport::new(options, handler, Arc::clone(&history));

        Client {
            config,
            session,
            transport,
            history,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_name(&self) -> &str {
        &self.config.client_name
    }

    /// Resolved `host:port` of the hub.
    pub fn address(&self) -> &str {
        self.transport.address()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connect to the hub. A no-op when already connected.
    ///
    /// The client never reconnects on its own; after a disconnect the host
    /// calls `connect` again when it wants to retry.
    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    /// Close the connection. Pending discovery calls fail with a connection error.
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await
    }

    /// Enumerate the hub's devices, waiting up to the configured discovery timeout.
    pub async fn discover_devices(&self) -> Result<Vec<String>> {
        self.discover_devices_with_timeout(self.config.discovery_timeout())
            .await
    }

    /// Enumerate the hub's devices and return every known device uuid.
    ///
    /// Completes once the hub has reported as many devices as it announced.
    /// If the wait times out, devices already known are returned; with no
    /// knowledge at all the call fails with [`Error::Timeout`]. The
    /// connection stays open either way.
    pub async fn discover_devices_with_timeout(&self, timeout: Duration) -> Result<Vec<String>> {
        let done = lock(&self.session.discovery).begin();

        if let Err(e) = self.send_request(&Request::DeviceList).await {
            drop(done);
            lock(&self.session.discovery).abandon();
            return Err(e);
        }

        match runtime::timeout(timeout, done).await {
            Ok(Ok(Ok(()))) => {
                let devices = self.devices();
                info!("discovered {} device(s)", devices.len());
                Ok(devices)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_canceled)) => Err(Error::disconnected("discovery abandoned")),
            Err(_) => {
                let (expected, found) = {
                    let mut discovery = lock(&self.session.discovery);
                    discovery.abandon();
                    (discovery.expected(), discovery.found())
                };
                if self.session.registry.is_empty() {
                    return Err(Error::timeout("device discovery", timeout));
                }
                warn!(
                    "discovery timed out after {timeout:?} ({found} of {expected:?} reported); using known devices"
                );
                Ok(self.devices())
            }
        }
    }

    /// Every known device uuid.
    pub fn devices(&self) -> Vec<String> {
        self.session.registry.list()
    }

    /// Snapshot of a device record.
    pub fn device(&self, uuid: &str) -> Result<Device> {
        self.session.registry.get(uuid)
    }

    pub fn state_for(&self, uuid: &str) -> Result<DeviceState> {
        self.session.registry.state(uuid)
    }

    pub fn name_for(&self, uuid: &str) -> Result<String> {
        self.session.registry.name(uuid)
    }

    /// Register the single listener notified whenever `uuid`'s state is updated.
    ///
    /// Replaces any listener registered earlier for the same device.
    pub fn set_state_callback<L: StateListener>(&self, uuid: &str, listener: L) {
        self.session.registry.set_listener(uuid, listener);
    }

    pub fn remove_state_callback(&self, uuid: &str) -> bool {
        self.session.registry.remove_listener(uuid)
    }

    /// Register a callback invoked once whenever an established session ends.
    pub fn set_disconnect_callback<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *lock(&self.session.on_disconnect) = Some(Arc::new(callback));
    }

    /// Ask the hub to set a device's power and dim level.
    ///
    /// The registry is not updated here: the new state shows up once the hub
    /// confirms it, which also fires the device's state callback.
    pub async fn send_control(&self, uuid: &str, power: bool, dim: u8) -> Result<()> {
        let dim = Dim::create(dim).ok_or_else(|| Error::InvalidDim(dim.to_string()))?;
        self.send_request(&Request::Control {
            target: uuid.to_string(),
            power,
            dim,
        })
        .await
    }

    /// Switch a known device on, at `dim` or else its last known level.
    pub async fn turn_on(&self, uuid: &str, dim: Option<u8>) -> Result<()> {
        let dim = match dim {
            Some(dim) => dim,
            None => self.current_dim(uuid)?,
        };
        self.send_control(uuid, true, dim).await
    }

    /// Switch a known device off, keeping its dim level for next time.
    pub async fn turn_off(&self, uuid: &str) -> Result<()> {
        let dim = self.current_dim(uuid)?;
        self.send_control(uuid, false, dim).await
    }

    pub async fn history(&self) -> MessageHistory {
        self.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Returns diagnostics including connection, devices and history.
    pub async fn diagnostics(&self) -> Value {
        let devices: Vec<Device> = self.session.registry.snapshot();
        let (expected, found) = {
            let discovery = lock(&self.session.discovery);
            (discovery.expected(), discovery.found())
        };

        let mut diag = json!({
            "address": self.address(),
            "client_name": self.client_name(),
            "connection": self.connection_state(),
            "discovery": {
                "expected": expected,
                "found": found,
            },
            "devices": devices,
        });

        let history = self.history.lock().await;
        diag["history"] = serde_json::to_value(history.summary()).unwrap_or(Value::Null);
        diag
    }

    fn current_dim(&self, uuid: &str) -> Result<u8> {
        let state = self.state_for(uuid)?;
        Ok(state.dim().unwrap_or_default().value())
    }

    async fn send_request(&self, request: &Request) -> Result<()> {
        let message = request.to_json(&self.config.client_name, Uuid::new_v4())?;
        let bytes = encode_line(&message)?;

        self.history.lock().await.record(MessageType::Send, &message);
        if let Err(e) = self.transport.send(&bytes).await {
            self.history.lock().await.record_error(&e.to_string());
            return Err(e);
        }
        debug!("sent {} request", request.kind());
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address())
            .field("client_name", &self.client_name())
            .field("state", &self.connection_state())
            .field("devices", &self.session.registry.len())
            .finish()
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
