#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use ecodrive_core::config::EcoDriveConfig;
use ecodrive_core::protocol::{DriverConfig, InitConfig};
use ecodrive_core::telemetry::PollerConfig;
use tracing_subscriber::EnvFilter;

/// How the mock adapter answers one command
pub enum Answer {
    Reply(String),
    Silent,
    /// Drop the link
    Hangup,
}

/// Scripted ELM327 on the far end of a duplex pipe
#[derive(Clone, Default)]
pub struct MockAdapter {
    /// Every command received, in order
    pub log: Arc<Mutex<Vec<String>>>,
    /// Report the car as stationary
    pub parked: Arc<AtomicBool>,
    /// Hang up when this many RPM requests have been served (0 = never)
    pub hangup_after_rpm: Arc<AtomicUsize>,
    /// Reply with junk to every PID request
    pub garbled: Arc<AtomicBool>,
    rpm_requests: Arc<AtomicUsize>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn answer(&self, command: &str) -> Answer {
        let reply = |s: &str| Answer::Reply(s.to_string());
        if command == "010C" {
            let served = self.rpm_requests.fetch_add(1, Ordering::SeqCst);
            let limit = self.hangup_after_rpm.load(Ordering::SeqCst);
            if limit > 0 && served >= limit {
                return Answer::Hangup;
            }
        }
        let garbled = self.garbled.load(Ordering::SeqCst);
        match command {
            "ATZ" => reply("\r\rELM327 v1.5"),
            "ATE0" => reply("ATE0\rOK"),
            "ATL0" | "ATH0" | "ATSP0" => reply("OK"),
            "ATDP" => reply("AUTO, ISO 15765-4 (CAN 11/500)"),
            "0100" => reply("SEARCHING...\r41 00 BE 3E B8 11"),
            "010C" if garbled => reply("GARBAGE!!"),
            "010D" if garbled => reply("41 0D ZZ"),
            "0105" if garbled => reply("SEARCHING..."),
            "0110" if garbled => reply("?"),
            "010C" => reply("41 0C 1A F8"),
            "010D" if self.parked.load(Ordering::SeqCst) => reply("41 0D 00"),
            "010D" => reply("41 0D 32"),
            "0105" => reply("41 05 5A"),
            "0110" => reply("41 10 01 F4"),
            _ => reply("?"),
        }
    }

    /// Serve commands on `stream` until the peer closes it or a hangup
    pub fn spawn(&self, mut stream: DuplexStream) -> JoinHandle<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            let mut pending = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                pending.extend_from_slice(&buf[..n]);
                while let Some(end) = pending.iter().position(|&b| b == b'\r') {
                    let line: Vec<u8> = pending.drain(..=end).collect();
                    let command = String::from_utf8_lossy(&line[..end]).trim().to_string();
                    adapter.log.lock().unwrap().push(command.clone());
                    match adapter.answer(&command) {
                        Answer::Reply(text) => {
                            let framed = format!("{text}\r\r>");
                            if stream.write_all(framed.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        Answer::Silent => {}
                        Answer::Hangup => return,
                    }
                }
            }
        })
    }
}

/// Route library logs through the test harness; set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Timings short enough for tests
pub fn fast_config() -> EcoDriveConfig {
    EcoDriveConfig {
        driver: DriverConfig {
            command_delay_ms: 0,
            reply_timeout_ms: 300,
            read_timeout_ms: 150,
        },
        init: InitConfig {
            settle_delay_ms: 0,
            command_delay_ms: 0,
        },
        poller: PollerConfig {
            inter_command_delay_ms: 2,
            error_backoff_ms: 10,
        },
        ..EcoDriveConfig::default()
    }
}

/// A connected pipe with the mock serving one end
pub fn mock_link(adapter: &MockAdapter) -> DuplexStream {
    let (client, server) = tokio::io::duplex(1024);
    adapter.spawn(server);
    client
}
