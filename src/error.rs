use crate::model::{EventId, EventKind, VehicleId};
use std::io;
use thiserror::Error;

/// Result alias for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by an [`EventRepository`](crate::EventRepository).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vehicle not found: {0}")]
    VehicleNotFound(VehicleId),
    #[error("vehicle already exists: {0}")]
    VehicleExists(VehicleId),
    #[error("{kind} event {id} not found for vehicle {vehicle}")]
    EventNotFound {
        vehicle: VehicleId,
        kind: EventKind,
        id: EventId,
    },
    #[error("vehicle {vehicle} changed underneath the caller: expected version {expected}, found {actual}")]
    VersionConflict {
        vehicle: VehicleId,
        expected: u64,
        actual: u64,
    },
    #[error("batch of {size} updates exceeds the store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error returned by ingestion and edit operations.
///
/// The validation variants are raised before anything is written.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("odometer {attempted} must be greater than the current reading {current}")]
    InvalidOdometer { current: f64, attempted: f64 },
    #[error("city distance {city} exceeds the distance driven since the last reading ({gap})")]
    InvalidDistanceSplit { gap: f64, city: f64 },
    #[error("{field} must be a non-negative number, got {value}")]
    InvalidQuantity { field: &'static str, value: f64 },
    #[error("distance logs carry no fuel; liters and price cannot be set")]
    FuelOnDistanceLog,
    #[error("vehicle {vehicle} was modified concurrently (expected version {expected}, found {actual}); retry")]
    StaleVehicleState {
        vehicle: VehicleId,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                vehicle,
                expected,
                actual,
            } => IngestError::StaleVehicleState {
                vehicle,
                expected,
                actual,
            },
            other => IngestError::Store(other),
        }
    }
}

/// Error returned by the window aggregator.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("invalid window {year}-{month:02}")]
    InvalidWindow { year: i32, month: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error returned when an [`EngineConfig`](crate::EngineConfig) is rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("anomaly factor must be a finite number >= 1.0, got {0}")]
    AnomalyFactor(f64),
    #[error("batch size must be at least 1")]
    BatchSize,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
