//! # EcoDrive Core Library
//!
//! Core functionality for the EcoDrive driving-efficiency monitor.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - ELM327 command/response communication over serial or TCP links
//! - OBD-II PID decoding and a cancellable telemetry polling loop
//! - Gear estimation and fuel/distance integration
//! - Trip summaries, efficiency scoring and trip persistence
//! - Rule-based and model-based driver classification
//!
//! ## Example
//!
//! ```rust,ignore
//! use ecodrive_core::prelude::*;
//!
//! let mut session = Session::new(EcoDriveConfig::load_or_default("config.json")?);
//! let transport = open_port("/dev/rfcomm0", Some(38400))?;
//! session.connect(transport).await?;
//!
//! let mut snapshots = session.start().await?;
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow().clone();
//!     println!("{} rpm, gear {}", snapshot.rpm, snapshot.gear);
//! }
//!
//! let summary = session.disconnect().await;
//! ```

pub mod classify;
pub mod config;
pub mod protocol;
pub mod scoring;
pub mod session;
pub mod telemetry;
pub mod trip;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::classify::{
        Classification, ClassificationBasis, DenseNetwork, DriverCategory, DriverModel,
        DriverProfile, MlClassifier, RuleClassifier, StandardScaler,
    };
    pub use crate::config::EcoDriveConfig;
    pub use crate::protocol::{list_ports, open_port, open_tcp, ConnectionState, ProtocolError};
    pub use crate::scoring::{EfficiencyScorer, ScoreGrade};
    pub use crate::session::Session;
    pub use crate::telemetry::{
        FieldFault, PollerState, Reading, TelemetrySample, TelemetrySnapshot,
    };
    pub use crate::trip::{
        GearLabel, JsonTripStore, MemoryTripStore, StoredTrip, TripStore, TripSummary, TripTracker,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
