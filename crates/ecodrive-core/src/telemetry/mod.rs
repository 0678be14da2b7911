//! Live telemetry
//!
//! Per-field readings, the per-cycle sample fed to the trip tracker, and the
//! snapshot published to observers once per poll cycle.

pub mod decode;
mod poller;

pub use decode::{decode, DecodeError, PidValue};
pub use poller::{PollControl, Poller, PollerConfig, PollerExit, PollerState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::protocol::{Pid, Reply};
use crate::trip::{GearLabel, Integration, TripState};

/// Why a field has no value this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFault {
    /// Empty reply, timeout or `NO DATA`
    NoData,
    /// Adapter still searching for a protocol
    Searching,
    /// `BUS INIT` failure
    BusInitError,
    /// `ERROR`, `CAN ERROR` or `?`
    AdapterError,
    /// Reply did not contain the requested PID
    UnexpectedResponse,
    /// Payload shorter than the PID needs
    Short,
    /// Payload is not valid hex
    Malformed,
    /// The exchange itself failed
    LinkError,
}

impl FieldFault {
    /// Fault for a non-data reply; `None` for data
    pub fn from_reply(reply: &Reply) -> Option<Self> {
        match reply {
            Reply::NoData => Some(FieldFault::NoData),
            Reply::Error => Some(FieldFault::AdapterError),
            Reply::Searching => Some(FieldFault::Searching),
            Reply::BusInitError => Some(FieldFault::BusInitError),
            Reply::UnexpectedResponse => Some(FieldFault::UnexpectedResponse),
            Reply::Data(_) => None,
        }
    }
}

impl From<DecodeError> for FieldFault {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Short { .. } => FieldFault::Short,
            DecodeError::Malformed => FieldFault::Malformed,
        }
    }
}

impl fmt::Display for FieldFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FieldFault::NoData => "No Data",
            FieldFault::Searching => "Searching...",
            FieldFault::BusInitError => "BUS INIT Error",
            FieldFault::AdapterError => "Error",
            FieldFault::UnexpectedResponse => "Unexpected Response",
            FieldFault::Short => "Invalid Data - Short",
            FieldFault::Malformed => "Parse Error",
            FieldFault::LinkError => "Link Error",
        };
        f.write_str(text)
    }
}

/// A field value or the marker explaining its absence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading<T> {
    /// Decoded value
    Value(T),
    /// Why there is no value
    Fault(FieldFault),
}

impl<T: Copy> Reading<T> {
    /// The value, if present
    pub fn value(&self) -> Option<T> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::Fault(_) => None,
        }
    }

    /// The fault, if any
    pub fn fault(&self) -> Option<FieldFault> {
        match self {
            Reading::Value(_) => None,
            Reading::Fault(f) => Some(*f),
        }
    }

    /// Map the value, keeping the fault
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Value(v) => Reading::Value(f(v)),
            Reading::Fault(fault) => Reading::Fault(fault),
        }
    }
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Fault(FieldFault::NoData)
    }
}

impl<T> From<Result<T, FieldFault>> for Reading<T> {
    fn from(result: Result<T, FieldFault>) -> Self {
        match result {
            Ok(v) => Reading::Value(v),
            Err(f) => Reading::Fault(f),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => v.fmt(f),
            Reading::Fault(fault) => write!(f, "- ({fault})"),
        }
    }
}

/// Readings gathered during one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Time since the session clock origin when the cycle completed
    pub timestamp: Duration,
    /// rev/min
    pub rpm: Reading<u32>,
    /// km/h
    pub speed_kmh: Reading<f64>,
    /// °C
    pub coolant_c: Reading<i32>,
    /// Mass air flow, g/s
    pub maf_gs: Reading<f64>,
}

impl TelemetrySample {
    /// Sample with every field present, mostly for replaying recorded data
    pub fn new(timestamp: Duration, rpm: u32, speed_kmh: f64, coolant_c: i32, maf_gs: f64) -> Self {
        Self {
            timestamp,
            rpm: Reading::Value(rpm),
            speed_kmh: Reading::Value(speed_kmh),
            coolant_c: Reading::Value(coolant_c),
            maf_gs: Reading::Value(maf_gs),
        }
    }

    /// Store a decoded value in the matching field
    pub fn set(&mut self, value: PidValue) {
        match value {
            PidValue::Rpm(v) => self.rpm = Reading::Value(v),
            PidValue::SpeedKmh(v) => self.speed_kmh = Reading::Value(v),
            PidValue::CoolantC(v) => self.coolant_c = Reading::Value(v),
            PidValue::MafGs(v) => self.maf_gs = Reading::Value(v),
        }
    }

    /// Mark the field for `pid` as missing
    pub fn set_fault(&mut self, pid: Pid, fault: FieldFault) {
        match pid {
            Pid::EngineRpm => self.rpm = Reading::Fault(fault),
            Pid::VehicleSpeed => self.speed_kmh = Reading::Fault(fault),
            Pid::CoolantTemp => self.coolant_c = Reading::Fault(fault),
            Pid::MassAirFlow => self.maf_gs = Reading::Fault(fault),
        }
    }
}

/// Everything an observer needs to render one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Poll cycle counter, starting at 1; 0 before the first cycle
    pub cycle: u64,
    /// Time since the session clock origin
    pub timestamp: Duration,
    /// rev/min
    pub rpm: Reading<u32>,
    /// km/h
    pub speed_kmh: Reading<f64>,
    /// Estimated gear
    pub gear: Reading<GearLabel>,
    /// °C
    pub coolant_c: Reading<i32>,
    /// Mass air flow, g/s
    pub maf_gs: Reading<f64>,
    /// Estimated air-fuel ratio
    pub afr: Reading<f64>,
    /// L/h
    pub instant_fuel_rate: Reading<f64>,
    /// L/100km; infinite while stationary
    pub instant_consumption: Reading<f64>,
    /// L/100km
    pub avg_consumption: Reading<f64>,
    /// Trip average, km/h
    pub avg_speed_kmh: Reading<f64>,
    /// Trip distance so far
    pub distance_km: Reading<f64>,
    /// Trip fuel so far, litres
    pub fuel_used_l: Reading<f64>,
}

impl TelemetrySnapshot {
    /// Snapshot published before any data has arrived
    pub fn empty() -> Self {
        Self::with_fault(0, Duration::ZERO, FieldFault::NoData)
    }

    /// Snapshot with every field set to `fault`
    pub fn with_fault(cycle: u64, timestamp: Duration, fault: FieldFault) -> Self {
        let f = Reading::Fault(fault);
        Self {
            cycle,
            timestamp,
            rpm: Reading::Fault(fault),
            speed_kmh: f,
            gear: Reading::Fault(fault),
            coolant_c: Reading::Fault(fault),
            maf_gs: f,
            afr: f,
            instant_fuel_rate: f,
            instant_consumption: f,
            avg_consumption: f,
            avg_speed_kmh: f,
            distance_km: f,
            fuel_used_l: f,
        }
    }

    /// Assemble the snapshot for a completed cycle
    pub fn from_cycle(
        cycle: u64,
        sample: &TelemetrySample,
        gear: Reading<GearLabel>,
        integration: Option<&Integration>,
        trip: &TripState,
    ) -> Self {
        let derived = |pick: fn(&Integration) -> f64| match integration {
            Some(i) => Reading::Value(pick(i)),
            None => Reading::Fault(FieldFault::NoData),
        };
        Self {
            cycle,
            timestamp: sample.timestamp,
            rpm: sample.rpm,
            speed_kmh: sample.speed_kmh,
            gear,
            coolant_c: sample.coolant_c,
            maf_gs: sample.maf_gs,
            afr: derived(|i| i.afr),
            instant_fuel_rate: derived(|i| i.instant_fuel_rate_lph),
            instant_consumption: derived(|i| i.instant_consumption),
            avg_consumption: Reading::Value(trip.avg_consumption()),
            avg_speed_kmh: Reading::Value(trip.avg_speed_kmh()),
            distance_km: Reading::Value(trip.distance_km()),
            fuel_used_l: Reading::Value(trip.fuel_used_l()),
        }
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_display() {
        let ok: Reading<u32> = Reading::Value(1726);
        let missing: Reading<u32> = Reading::Fault(FieldFault::NoData);
        assert_eq!(ok.to_string(), "1726");
        assert_eq!(missing.to_string(), "- (No Data)");
    }

    #[test]
    fn test_fault_from_reply() {
        assert_eq!(FieldFault::from_reply(&Reply::Searching), Some(FieldFault::Searching));
        assert_eq!(FieldFault::from_reply(&Reply::Data("32".into())), None);
    }

    #[test]
    fn test_sample_set() {
        let mut sample = TelemetrySample::default();
        sample.set(PidValue::SpeedKmh(50.0));
        assert_eq!(sample.speed_kmh.value(), Some(50.0));
        assert_eq!(sample.rpm.fault(), Some(FieldFault::NoData));
    }

    #[test]
    fn test_fault_snapshot_serializes() {
        let snapshot = TelemetrySnapshot::with_fault(3, Duration::from_secs(1), FieldFault::LinkError);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("link_error"));
    }
}
