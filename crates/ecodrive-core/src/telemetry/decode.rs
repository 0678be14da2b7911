//! PID payload decoding
//!
//! Converts the hex payload of a data reply into a physical value. Pure and
//! total: every input yields either a value or a [`DecodeError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::Pid;

/// Decode failure for a single field
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    /// Fewer hex digits than the PID needs
    #[error("payload too short: need {needed} hex chars, got {got}")]
    Short {
        /// Hex digits the PID requires
        needed: usize,
        /// Hex digits received
        got: usize,
    },

    /// Non-hex characters in the payload
    #[error("payload is not valid hex")]
    Malformed,
}

/// Decoded physical value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PidValue {
    /// Engine speed, rev/min
    Rpm(u32),
    /// Vehicle speed, km/h
    SpeedKmh(f64),
    /// Coolant temperature, °C
    CoolantC(i32),
    /// Mass air flow, g/s
    MafGs(f64),
}

/// Decode `payload` for `pid`
pub fn decode(pid: Pid, payload: &str) -> Result<PidValue, DecodeError> {
    let bytes = data_bytes(payload, pid.data_bytes())?;
    let value = match pid {
        Pid::EngineRpm => {
            let raw = 256 * u32::from(bytes[0]) + u32::from(bytes[1]);
            PidValue::Rpm(raw / 4)
        }
        Pid::VehicleSpeed => PidValue::SpeedKmh(f64::from(bytes[0])),
        Pid::CoolantTemp => PidValue::CoolantC(i32::from(bytes[0]) - 40),
        Pid::MassAirFlow => {
            let raw = 256 * u32::from(bytes[0]) + u32::from(bytes[1]);
            PidValue::MafGs(f64::from(raw) / 100.0)
        }
    };
    Ok(value)
}

/// Parse the first `count` bytes (A, B, ...) out of a hex string
fn data_bytes(payload: &str, count: usize) -> Result<Vec<u8>, DecodeError> {
    let needed = count * 2;
    let raw = payload.as_bytes();
    if raw.len() < needed {
        return Err(DecodeError::Short {
            needed,
            got: raw.len(),
        });
    }

    raw[..needed]
        .chunks(2)
        .map(|pair| Ok(hex_nibble(pair[0])? << 4 | hex_nibble(pair[1])?))
        .collect()
}

fn hex_nibble(b: u8) -> Result<u8, DecodeError> {
    char::from(b)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or(DecodeError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rpm() {
        assert_eq!(decode(Pid::EngineRpm, "1AF8"), Ok(PidValue::Rpm(1726)));
        assert_eq!(decode(Pid::EngineRpm, "0000"), Ok(PidValue::Rpm(0)));
        assert_eq!(decode(Pid::EngineRpm, "FFFF"), Ok(PidValue::Rpm(16383)));
    }

    #[test]
    fn test_decode_speed() {
        assert_eq!(decode(Pid::VehicleSpeed, "32"), Ok(PidValue::SpeedKmh(50.0)));
    }

    #[test]
    fn test_decode_coolant() {
        assert_eq!(decode(Pid::CoolantTemp, "5A"), Ok(PidValue::CoolantC(50)));
        assert_eq!(decode(Pid::CoolantTemp, "00"), Ok(PidValue::CoolantC(-40)));
    }

    #[test]
    fn test_decode_maf() {
        assert_eq!(decode(Pid::MassAirFlow, "01F4"), Ok(PidValue::MafGs(5.0)));
    }

    #[test]
    fn test_extra_bytes_are_ignored() {
        assert_eq!(decode(Pid::VehicleSpeed, "32AA"), Ok(PidValue::SpeedKmh(50.0)));
    }

    #[test]
    fn test_short_payload() {
        assert_eq!(
            decode(Pid::EngineRpm, "1AF"),
            Err(DecodeError::Short { needed: 4, got: 3 })
        );
        assert_eq!(
            decode(Pid::CoolantTemp, ""),
            Err(DecodeError::Short { needed: 2, got: 0 })
        );
    }

    #[test]
    fn test_malformed_payload() {
        assert_eq!(decode(Pid::EngineRpm, "1G F8"), Err(DecodeError::Malformed));
        assert_eq!(decode(Pid::VehicleSpeed, "+1"), Err(DecodeError::Malformed));
        assert_eq!(decode(Pid::VehicleSpeed, "é1"), Err(DecodeError::Malformed));
        assert_eq!(decode(Pid::EngineRpm, "1éF"), Err(DecodeError::Malformed));
    }
}
