//! Protocol commands
//!
//! The fixed ELM327 command set: adapter configuration (AT) commands and the
//! mode 01 telemetry PIDs polled during a drive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Adapter configuration commands, in the order they are sent at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtCommand {
    /// Reset the interpreter (`ATZ`)
    Reset,
    /// Echo off (`ATE0`)
    EchoOff,
    /// Linefeeds off (`ATL0`)
    LinefeedsOff,
    /// Headers off (`ATH0`)
    HeadersOff,
    /// Automatic protocol selection (`ATSP0`)
    ProtocolAuto,
    /// Describe the current protocol (`ATDP`)
    DisplayProtocol,
}

impl AtCommand {
    /// Initialization sequence
    pub const INIT_SEQUENCE: [AtCommand; 6] = [
        AtCommand::Reset,
        AtCommand::EchoOff,
        AtCommand::LinefeedsOff,
        AtCommand::HeadersOff,
        AtCommand::ProtocolAuto,
        AtCommand::DisplayProtocol,
    ];

    /// Command text without terminator
    pub fn as_str(&self) -> &'static str {
        match self {
            AtCommand::Reset => "ATZ",
            AtCommand::EchoOff => "ATE0",
            AtCommand::LinefeedsOff => "ATL0",
            AtCommand::HeadersOff => "ATH0",
            AtCommand::ProtocolAuto => "ATSP0",
            AtCommand::DisplayProtocol => "ATDP",
        }
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request for the supported-PID bitmap, sent once to prime the adapter
pub const SUPPORTED_PIDS_COMMAND: &str = "0100";

/// Telemetry PIDs (service 01)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pid {
    /// Engine speed (`0C`)
    EngineRpm,
    /// Vehicle speed (`0D`)
    VehicleSpeed,
    /// Engine coolant temperature (`05`)
    CoolantTemp,
    /// Mass air flow rate (`10`)
    MassAirFlow,
}

impl Pid {
    /// Fixed polling order
    pub const POLL_ORDER: [Pid; 4] = [
        Pid::EngineRpm,
        Pid::VehicleSpeed,
        Pid::CoolantTemp,
        Pid::MassAirFlow,
    ];

    /// PID code byte
    pub fn code(&self) -> u8 {
        match self {
            Pid::EngineRpm => 0x0C,
            Pid::VehicleSpeed => 0x0D,
            Pid::CoolantTemp => 0x05,
            Pid::MassAirFlow => 0x10,
        }
    }

    /// Full request text (`01` + PID)
    pub fn command(&self) -> &'static str {
        match self {
            Pid::EngineRpm => "010C",
            Pid::VehicleSpeed => "010D",
            Pid::CoolantTemp => "0105",
            Pid::MassAirFlow => "0110",
        }
    }

    /// Two-character PID echo expected in a data reply
    pub fn echo(&self) -> &'static str {
        &self.command()[2..]
    }

    /// Number of data bytes the decoder needs
    pub fn data_bytes(&self) -> usize {
        match self {
            Pid::EngineRpm | Pid::MassAirFlow => 2,
            Pid::VehicleSpeed | Pid::CoolantTemp => 1,
        }
    }

    /// Display unit
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::EngineRpm => "RPM",
            Pid::VehicleSpeed => "km/h",
            Pid::CoolantTemp => "°C",
            Pid::MassAirFlow => "g/s",
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}
