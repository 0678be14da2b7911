//! Adapter initialization
//!
//! Runs the fixed AT configuration sequence and primes the adapter with a
//! supported-PIDs request before polling starts.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::commands::{AtCommand, SUPPORTED_PIDS_COMMAND};
use super::{CommandDriver, ProtocolError, Transport};

/// Tokens that count as an acknowledgment (case-insensitive)
const ACK_TOKENS: [&str; 3] = ["OK", "ELM", "AUTO"];

/// Initialization timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Wait before the first command so the adapter can settle after the link opens
    pub settle_delay_ms: u64,
    /// Delay between writing each init command and reading its reply
    pub command_delay_ms: u64,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            command_delay_ms: 300,
        }
    }
}

/// True if an initialization reply acknowledges the command
pub fn is_acknowledged(response: &str) -> bool {
    let upper = response.to_ascii_uppercase();
    ACK_TOKENS.iter().any(|token| upper.contains(token))
}

/// Drives the start-up sequence against a [`CommandDriver`]
pub struct AdapterInitializer {
    config: InitConfig,
}

impl AdapterInitializer {
    /// Create an initializer with the given timing
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    /// Run the sequence.
    ///
    /// Returns the adapter's identification line (the reply to `ATZ`) on
    /// success. The first unacknowledged command aborts with
    /// [`ProtocolError::InitFailed`]; the caller must tear the link down.
    pub async fn run<T: Transport>(
        &self,
        driver: &mut CommandDriver<T>,
    ) -> Result<String, ProtocolError> {
        let delay = Duration::from_millis(self.config.command_delay_ms);
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let mut identity = String::new();
        for command in AtCommand::INIT_SEQUENCE {
            let response = driver.exchange_after(command.as_str(), delay).await?;
            if !is_acknowledged(&response) {
                warn!(%command, %response, "adapter rejected init command");
                return Err(ProtocolError::InitFailed {
                    command: command.as_str().to_string(),
                    response,
                });
            }
            debug!(%command, %response, "init command acknowledged");
            if command == AtCommand::Reset {
                identity = response.lines().last().unwrap_or_default().trim().to_string();
            }
        }

        // Some adapters misbehave until they have answered one OBD request
        match driver.exchange_after(SUPPORTED_PIDS_COMMAND, delay).await {
            Ok(response) => debug!(%response, "priming exchange discarded"),
            Err(e) => warn!("priming exchange failed: {e}"),
        }

        info!(adapter = %identity, "adapter initialized");
        Ok(identity)
    }
}

impl Default for AdapterInitializer {
    fn default() -> Self {
        Self::new(InitConfig::default())
    }
}
