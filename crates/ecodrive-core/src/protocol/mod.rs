//! ELM327 Protocol Communication
//!
//! Implements the ASCII command/response protocol spoken by ELM327-class
//! OBD-II interpreters: one CR-terminated command at a time, replies ending in
//! a `>` prompt.

pub mod commands;
mod driver;
mod error;
mod init;
pub mod reply;
pub mod serial;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

pub use commands::{AtCommand, Pid};
pub use driver::{CommandDriver, DriverConfig};
pub use error::ProtocolError;
pub use init::{is_acknowledged, AdapterInitializer, InitConfig};
pub use reply::{classify_reply, clean_reply, Reply};
pub use serial::{list_ports, open_port, open_tcp, PortInfo};

/// Default baud rate for Bluetooth/USB ELM327 adapters
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Default upper bound for collecting one reply, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Duplex byte stream to the adapter
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Type-erased transport, as returned by the openers in [`serial`]
pub type BoxedTransport = Box<dyn Transport>;

/// Adapter link state, as observed by session consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Link open, initialization in progress
    Connecting,
    /// Initialized and ready to poll
    Connected,
    /// Connect or initialization failed
    Error,
}
