//! Protocol errors

use std::io;
use thiserror::Error;

/// Errors that can occur while talking to the OBD-II adapter
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Opening or configuring the serial port failed
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The transport could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No adapter link is open
    #[error("Not connected to adapter")]
    NotConnected,

    /// A session already holds a connection
    #[error("Already connected")]
    AlreadyConnected,

    /// An initialization command was not acknowledged
    #[error("Adapter did not acknowledge '{command}': got '{response}'")]
    InitFailed {
        /// The AT command that was sent
        command: String,
        /// What the adapter answered instead
        response: String,
    },

    /// There is no running poll task to ask
    #[error("Polling task is not running")]
    PollerStopped,

    /// Read or write on the link failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// True when the error means the link itself is gone and retrying on the
    /// same transport is pointless.
    pub fn is_link_lost(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            ProtocolError::NotConnected => true,
            _ => false,
        }
    }
}
