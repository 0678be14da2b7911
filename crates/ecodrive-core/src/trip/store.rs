//! Trip persistence
//!
//! Finished trips are kept in a [`TripStore`]. Two implementations ship with
//! the crate: a JSON file holding every trip, and an in-memory store for
//! tests and short-lived sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::TripSummary;
use crate::scoring::EfficiencyScorer;

/// Identifier assigned to a trip when it is saved
pub type TripId = Uuid;

/// Errors reading or writing stored trips
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store file is not valid JSON
    #[error("Trip file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// No trip has this id
    #[error("No trip with id {0}")]
    NotFound(TripId),

    /// Neither a data nor a home directory is known
    #[error("Could not find a data directory")]
    NoDataDir,
}

/// A trip as kept by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrip {
    /// Assigned on save
    pub id: TripId,
    /// When the trip was saved
    pub recorded_at: DateTime<Utc>,
    /// The trip itself
    pub summary: TripSummary,
}

impl StoredTrip {
    /// Wrap a summary with a fresh id and the current time
    pub fn new(summary: TripSummary) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            summary,
        }
    }

    /// Score the trip if it was stored without one. Returns true if it changed.
    pub fn ensure_scored(&mut self, scorer: &EfficiencyScorer) -> bool {
        if self.summary.efficiency_score.is_some() {
            return false;
        }
        self.summary.efficiency_score = Some(scorer.score(&self.summary));
        true
    }
}

/// Storage for finished trips
pub trait TripStore {
    /// Persist a trip and return its id
    fn save(&mut self, summary: TripSummary) -> Result<TripId, StoreError>;

    /// Up to `recent_n` trips, newest first
    fn list(&self, recent_n: usize) -> Result<Vec<StoredTrip>, StoreError>;

    /// Remove a trip; [`StoreError::NotFound`] if there is none with `id`
    fn delete(&mut self, id: TripId) -> Result<(), StoreError>;
}

/// Newest first; trips recorded in the same instant keep reverse insertion order
fn newest_first(trips: &[StoredTrip], recent_n: usize) -> Vec<StoredTrip> {
    let mut sorted: Vec<StoredTrip> = trips.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    sorted.truncate(recent_n);
    sorted
}

/// Trips kept in memory only
#[derive(Debug, Default)]
pub struct MemoryTripStore {
    trips: Vec<StoredTrip>,
}

impl MemoryTripStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored trips
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }
}

impl TripStore for MemoryTripStore {
    fn save(&mut self, summary: TripSummary) -> Result<TripId, StoreError> {
        let trip = StoredTrip::new(summary);
        let id = trip.id;
        self.trips.push(trip);
        Ok(id)
    }

    fn list(&self, recent_n: usize) -> Result<Vec<StoredTrip>, StoreError> {
        Ok(newest_first(&self.trips, recent_n))
    }

    fn delete(&mut self, id: TripId) -> Result<(), StoreError> {
        let before = self.trips.len();
        self.trips.retain(|t| t.id != id);
        if self.trips.len() == before {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

/// On-disk document
#[derive(Debug, Default, Serialize, Deserialize)]
struct TripFile {
    #[serde(default)]
    trips: Vec<StoredTrip>,
}

/// All trips in a single JSON document
pub struct JsonTripStore {
    path: PathBuf,
    scorer: EfficiencyScorer,
}

impl JsonTripStore {
    /// Default file location (in app data)
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or(StoreError::NoDataDir)?;
        Ok(base.join("EcoDrive").join("trips.json"))
    }

    /// Open the store at `path`, or at the default location.
    ///
    /// The file is created on the first save.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        debug!(path = %path.display(), "opening trip store");
        Ok(Self {
            path,
            scorer: EfficiencyScorer::default(),
        })
    }

    /// Scorer used for trips stored without a score
    pub fn with_scorer(mut self, scorer: EfficiencyScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// File backing the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<TripFile, StoreError> {
        if !self.path.exists() {
            return Ok(TripFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut file: TripFile = serde_json::from_str(&content)?;
        for trip in &mut file.trips {
            if trip.ensure_scored(&self.scorer) {
                debug!(id = %trip.id, "rescored stored trip");
            }
        }
        Ok(file)
    }

    fn write(&self, file: &TripFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl TripStore for JsonTripStore {
    fn save(&mut self, summary: TripSummary) -> Result<TripId, StoreError> {
        let mut file = self.load()?;
        let trip = StoredTrip::new(summary);
        let id = trip.id;
        file.trips.push(trip);
        self.write(&file)?;
        info!(%id, path = %self.path.display(), "trip saved");
        Ok(id)
    }

    fn list(&self, recent_n: usize) -> Result<Vec<StoredTrip>, StoreError> {
        let file = self.load()?;
        Ok(newest_first(&file.trips, recent_n))
    }

    fn delete(&mut self, id: TripId) -> Result<(), StoreError> {
        let mut file = self.load()?;
        let before = file.trips.len();
        file.trips.retain(|t| t.id != id);
        if file.trips.len() == before {
            return Err(StoreError::NotFound(id));
        }
        self.write(&file)?;
        info!(%id, "trip deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn summary(distance_km: f64) -> TripSummary {
        TripSummary {
            avg_speed_kmh: 60.0,
            distance_km,
            avg_fuel_consumption: 4.0,
            fuel_used_l: distance_km * 0.04,
            duration: Duration::from_secs(600),
            max_rpm: 2000,
            avg_rpm: 1400.0,
            efficiency_score: Some(100),
        }
    }

    #[test]
    fn test_memory_store_newest_first() {
        let mut store = MemoryTripStore::new();
        store.save(summary(1.0)).unwrap();
        store.save(summary(2.0)).unwrap();
        let last = store.save(summary(3.0)).unwrap();

        let recent = store.list(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, last);
        assert_eq!(recent[0].summary.distance_km, 3.0);
        assert_eq!(recent[1].summary.distance_km, 2.0);
    }

    #[test]
    fn test_memory_store_delete() {
        let mut store = MemoryTripStore::new();
        let id = store.save(summary(1.0)).unwrap();
        store.delete(id).unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_json_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("trips.json");

        let mut store = JsonTripStore::open(Some(path.as_path())).unwrap();
        assert!(store.list(10).unwrap().is_empty());
        let id = store.save(summary(5.0)).unwrap();
        assert!(path.exists());

        let reopened = JsonTripStore::open(Some(path.as_path())).unwrap();
        let trips = reopened.list(10).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, id);
        assert_eq!(trips[0].summary, summary(5.0));
    }

    #[test]
    fn test_json_store_rescores_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.json");
        let mut unscored = StoredTrip::new(summary(5.0));
        unscored.summary.efficiency_score = None;
        let file = TripFile {
            trips: vec![unscored],
        };
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

        let store = JsonTripStore::open(Some(path.as_path())).unwrap();
        let trips = store.list(1).unwrap();
        assert_eq!(trips[0].summary.efficiency_score, Some(100));
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonTripStore::open(Some(path.as_path())).unwrap();
        assert!(matches!(store.list(1), Err(StoreError::Corrupt(_))));
    }
}
