//! Reply cleaning and classification
//!
//! ELM327 replies carry no framing beyond the trailing `>` prompt. A reply can
//! arrive with the command echoed back, with status text instead of data, or
//! with data mixed into noise. This module turns the raw text into a [`Reply`].

use serde::{Deserialize, Serialize};

/// Prompt character the adapter prints when it is ready for the next command
pub const PROMPT: char = '>';

/// Classified adapter reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Empty reply, timeout, or `NO DATA`
    NoData,
    /// `ERROR`, `CAN ERROR` or `?`
    Error,
    /// Adapter is still searching for a protocol
    Searching,
    /// `BUS INIT` failure
    BusInitError,
    /// Text that does not contain the requested PID
    UnexpectedResponse,
    /// Hex payload following the PID echo
    Data(String),
}

impl Reply {
    /// Payload for data replies
    pub fn payload(&self) -> Option<&str> {
        match self {
            Reply::Data(p) => Some(p),
            _ => None,
        }
    }
}

/// Strip the prompt, a leading echo of `command`, and surrounding whitespace.
pub fn clean_reply(command: &str, raw: &str) -> String {
    let without_prompt: String = raw.chars().filter(|&c| c != PROMPT).collect();
    let trimmed = without_prompt.trim();

    // With echo still on (before ATE0 took effect) the command comes back first
    let has_echo = trimmed
        .get(..command.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(command));
    if has_echo && !command.is_empty() {
        trimmed[command.len()..].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Classify a cleaned reply to `command`. First match wins.
pub fn classify_reply(command: &str, cleaned: &str) -> Reply {
    let upper = cleaned.to_ascii_uppercase();

    if upper.is_empty() || upper == "NO DATA" {
        return Reply::NoData;
    }
    if upper.contains("ERROR") || upper.starts_with('?') {
        return Reply::Error;
    }
    if upper.contains("SEARCHING") {
        return Reply::Searching;
    }
    if upper.contains("BUS INIT") {
        return Reply::BusInitError;
    }

    let echo = command
        .get(command.len().saturating_sub(2)..)
        .unwrap_or_default()
        .to_ascii_uppercase();
    match upper.find(&echo) {
        Some(idx) if !echo.is_empty() => {
            let payload: String = upper[idx + echo.len()..]
                .chars()
                .filter(|c| c.is_ascii_hexdigit())
                .collect();
            Reply::Data(payload)
        }
        _ => Reply::UnexpectedResponse,
    }
}
