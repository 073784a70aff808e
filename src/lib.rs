//! # deako_rs
//!
//! An async Rust client for Deako smart-lighting hubs on the local network.
//!
//! The hub speaks newline-delimited JSON over a plain TCP connection. This
//! crate keeps one session open, enumerates the devices behind the hub,
//! tracks their power and dim state from the hub's pushes, and sends
//! control commands. It is **runtime-agnostic**: the same API works on
//! tokio, async-std or smol.
//!
//! ## Quick Start
//!
//! ```ignore
//! use deako_rs::Client;
//!
//! async fn dim_everything() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("192.168.1.50", "My App");
//!     client.connect().await?;
//!
//!     for uuid in client.discover_devices().await? {
//!         if client.state_for(&uuid)?.is_dimmable() {
//!             client.send_control(&uuid, true, 40).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Discovery**: Enumerate every device the hub controls with [`Client::discover_devices`]
//! - **Live State**: A [`DeviceRegistry`] mirrors the state the hub reports
//! - **Control**: Set power and [`Dim`] level with [`Client::send_control`]
//! - **Callbacks**: Per-device [`StateListener`]s fire on every reported change
//! - **Disconnect Notification**: Hosts decide when to reconnect
//! - **Diagnostics**: A bounded [`MessageHistory`] of recent traffic
//!
//! ## State Updates
//!
//! Control commands never update local state on their own. The registry
//! changes only when the hub reports the device's new state, and each report
//! fires the device's listener exactly once. Listeners run on the connection's
//! receive task; use [`ForwardingListener`] to move slow work elsewhere.
//!
//! ## Runtime Selection
//!
//! Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! deako-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! deako-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! deako-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod client;
pub mod codec;
mod config;
mod device;
mod discovery;
mod dispatch;
mod errors;
mod history;
mod registry;
pub mod runtime;
mod transport;
mod types;

// Re-export public API
pub use client::Client;
pub use codec::{Frame, FrameDecoder, MessageKind, Request};
pub use config::ClientConfig;
pub use device::{Device, DeviceState};
pub use dispatch::{CallbackDispatcher, DisconnectCallback, ForwardingListener, StateListener};
pub use errors::Error;
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use registry::DeviceRegistry;
pub use transport::ConnectionState;
pub use types::Dim;
