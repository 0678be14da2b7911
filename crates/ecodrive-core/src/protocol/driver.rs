//! Command/response driver
//!
//! Sends one ASCII command at a time over the transport and collects the reply
//! until the adapter prompt arrives or the read window closes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use super::reply::{classify_reply, clean_reply, Reply, PROMPT};
use super::{ProtocolError, Transport};

/// Size of a single read from the transport
const READ_CHUNK: usize = 1024;

/// Timing for a single command/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Delay between writing a command and the first read
    pub command_delay_ms: u64,
    /// Upper bound for collecting one reply
    pub reply_timeout_ms: u64,
    /// Upper bound for each individual read
    pub read_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command_delay_ms: 50,
            reply_timeout_ms: super::DEFAULT_TIMEOUT_MS,
            read_timeout_ms: 1000,
        }
    }
}

/// Owns the transport and serializes exchanges on it
pub struct CommandDriver<T> {
    transport: T,
    config: DriverConfig,
    /// Metrics: cumulative bytes/commands sent & received
    tx_bytes: u64,
    rx_bytes: u64,
    commands: u64,
}

impl<T: Transport> CommandDriver<T> {
    /// Wrap an open transport
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            transport,
            config,
            tx_bytes: 0,
            rx_bytes: 0,
            commands: 0,
        }
    }

    /// Driver timing
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Cumulative tx bytes, rx bytes and commands sent
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.commands)
    }

    /// Send `command` and return the cleaned reply text.
    ///
    /// A timeout or an empty read yields an empty string, not an error.
    /// Only transport failures are reported as errors.
    pub async fn exchange(&mut self, command: &str) -> Result<String, ProtocolError> {
        let delay = Duration::from_millis(self.config.command_delay_ms);
        self.exchange_after(command, delay).await
    }

    /// Like [`exchange`](Self::exchange) with an explicit post-write delay
    pub async fn exchange_after(
        &mut self,
        command: &str,
        delay: Duration,
    ) -> Result<String, ProtocolError> {
        self.discard_pending().await;

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\r');

        self.transport.write_all(&frame).await?;
        self.transport.flush().await?;
        self.tx_bytes += frame.len() as u64;
        self.commands += 1;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let raw = self.read_reply().await?;
        let cleaned = clean_reply(command, &raw);
        debug!(command, reply = %cleaned, "exchange");
        Ok(cleaned)
    }

    /// Exchange and classify in one step
    pub async fn request(&mut self, command: &str) -> Result<Reply, ProtocolError> {
        let cleaned = self.exchange(command).await?;
        Ok(classify_reply(command, &cleaned))
    }

    /// Drop bytes already waiting on the link, such as a reply that arrived
    /// after its exchange gave up. Read errors are left for the write to report.
    async fn discard_pending(&mut self) {
        let mut buf = [0u8; READ_CHUNK];
        let mut dropped = 0usize;
        while let Ok(Ok(n)) = timeout(Duration::ZERO, self.transport.read(&mut buf)).await {
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            self.rx_bytes += dropped as u64;
            trace!(dropped, "discarded stale input");
        }
    }

    async fn read_reply(&mut self) -> Result<String, ProtocolError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.reply_timeout_ms);
        let per_read = Duration::from_millis(self.config.read_timeout_ms);
        let mut collected: Vec<u8> = Vec::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let now = Instant::now();
            if now >= deadline {
                trace!("reply window closed with {} bytes", collected.len());
                break;
            }
            let window = per_read.min(deadline - now);

            match timeout(window, self.transport.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    self.rx_bytes += n as u64;
                    collected.extend_from_slice(&buf[..n]);
                    if collected.contains(&(PROMPT as u8)) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(ProtocolError::Io(e)),
                Err(_) => {
                    trace!("read timed out with {} bytes", collected.len());
                    break;
                }
            }
        }

        Ok(String::from_utf8_lossy(&collected).into_owned())
    }

    /// Flush and shut down the write half, then hand the transport back
    pub async fn shutdown(mut self) -> Result<T, ProtocolError> {
        self.transport.shutdown().await?;
        Ok(self.transport)
    }

    /// Give up the transport without shutting it down
    pub fn into_inner(self) -> T {
        self.transport
    }
}
