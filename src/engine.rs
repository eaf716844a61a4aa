//! The [`Engine`]: a repository plus the configuration every operation needs.

use crate::config::EngineConfig;
use crate::error::{ConfigError, IngestError, StoreResult, WindowError};
use crate::ingest::{self, DistanceInput, IngestReceipt, RefuelingInput};
use crate::model::{EventEdit, EventId, EventKind, StoredEvent, Vehicle, VehicleId, VehicleUpdate};
use crate::recompute::{recompute_vehicle, AggregateSummary};
use crate::replay::{replay_vehicle, Reconciliation};
use crate::repository::{chronological, EventRepository};
use crate::window::{aggregate_window, aggregate_year, WindowRequest, WindowStats, YearOverview};

/// Fleet ledger over a repository `R`.
///
/// Writes validate, persist, and then replay the affected vehicle so its
/// derived fields and summary follow from the full event history.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use fleetfold::{Engine, MemoryRepository, RefuelingInput, Vehicle, VehicleId};
///
/// let mut engine = Engine::new(MemoryRepository::new());
/// engine
///     .register_vehicle(Vehicle::new("van-1", "Transit", 60.0, 10_000.0, 30.0))
///     .unwrap();
///
/// let van = VehicleId::from("van-1");
/// let receipt = engine
///     .record_refueling(
///         &van,
///         &RefuelingInput {
///             date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
///             odometer_total: 10_500.0,
///             liters: 40.0,
///             price: 60.0,
///             city_distance: 200.0,
///         },
///     )
///     .unwrap();
/// assert!(receipt.reconciliation.is_reconciled());
/// assert_eq!(engine.vehicle(&van).unwrap().average_consumption, 8.0);
/// ```
#[derive(Debug)]
pub struct Engine<R> {
    repo: R,
    config: EngineConfig,
}

/// Builder for [`Engine`].
#[derive(Debug)]
pub struct EngineBuilder<R> {
    repo: R,
    config: EngineConfig,
}

impl<R: EventRepository> EngineBuilder<R> {
    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Multiple of the reference consumption above which a month's
    /// measured figure is replaced by an estimate.
    pub fn anomaly_factor(mut self, factor: f64) -> Self {
        self.config.anomaly_factor = factor;
        self
    }

    /// Events per replay write-back batch, capped by the repository limit.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<Engine<R>, ConfigError> {
        self.config.validate()?;
        Ok(Engine {
            repo: self.repo,
            config: self.config,
        })
    }
}

impl<R: EventRepository> Engine<R> {
    /// Engine with the default configuration.
    pub fn new(repo: R) -> Self {
        Engine {
            repo,
            config: EngineConfig::default(),
        }
    }

    /// Configure an engine; settings are checked by [`EngineBuilder::build`].
    pub fn builder(repo: R) -> EngineBuilder<R> {
        EngineBuilder {
            repo,
            config: EngineConfig::default(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the underlying store.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Direct access to the store. Writes made here skip validation and
    /// replay; follow them with [`replay`](Self::replay).
    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repo
    }

    /// Give back the store, e.g. to reopen it with another configuration.
    pub fn into_repository(self) -> R {
        self.repo
    }

    /// Add a vehicle with its declared parameters. Summary fields passed
    /// in are discarded and reset from the starting values.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidQuantity`] for a negative or non-finite
    /// setting, or a starting tank above capacity. A duplicate id surfaces
    /// as [`IngestError::Store`].
    pub fn register_vehicle(&mut self, vehicle: Vehicle) -> Result<(), IngestError> {
        ingest::register_vehicle(&mut self.repo, vehicle)
    }

    /// Change declared parameters (capacity, starting values, norms) and
    /// replay the vehicle from its new starting point.
    pub fn update_vehicle_settings(
        &mut self,
        vehicle_id: &VehicleId,
        update: &VehicleUpdate,
    ) -> Result<Reconciliation, IngestError> {
        ingest::update_vehicle_settings(&mut self.repo, vehicle_id, update, self.config.batch_size)
    }

    /// The stored vehicle, summary included.
    pub fn vehicle(&self, vehicle_id: &VehicleId) -> StoreResult<Vehicle> {
        self.repo.get_vehicle(vehicle_id)
    }

    /// Record a fuel purchase. See [`ingest::record_refueling`].
    pub fn record_refueling(
        &mut self,
        vehicle_id: &VehicleId,
        input: &RefuelingInput,
    ) -> Result<IngestReceipt, IngestError> {
        ingest::record_refueling(&mut self.repo, vehicle_id, input, self.config.batch_size)
    }

    /// Record a drive without fuel.
    pub fn record_distance(
        &mut self,
        vehicle_id: &VehicleId,
        input: &DistanceInput,
    ) -> Result<IngestReceipt, IngestError> {
        ingest::record_distance(&mut self.repo, vehicle_id, input, self.config.batch_size)
    }

    /// Patch a stored event and replay the vehicle.
    ///
    /// Fuel fields are refused on a distance log with
    /// [`IngestError::FuelOnDistanceLog`].
    pub fn edit_event(
        &mut self,
        vehicle_id: &VehicleId,
        kind: EventKind,
        event_id: EventId,
        edit: EventEdit,
    ) -> Result<Reconciliation, IngestError> {
        ingest::edit_event(
            &mut self.repo,
            vehicle_id,
            kind,
            event_id,
            edit,
            self.config.batch_size,
        )
    }

    /// Remove a stored event and replay the vehicle.
    pub fn delete_event(
        &mut self,
        vehicle_id: &VehicleId,
        kind: EventKind,
        event_id: EventId,
    ) -> Result<Reconciliation, IngestError> {
        ingest::delete_event(&mut self.repo, vehicle_id, kind, event_id, self.config.batch_size)
    }

    /// Re-derive every event and the summary of a vehicle.
    pub fn replay(&mut self, vehicle_id: &VehicleId) -> Reconciliation {
        replay_vehicle(&mut self.repo, vehicle_id, self.config.batch_size)
    }

    /// Rebuild only the summary totals from the stored events.
    pub fn recompute(&mut self, vehicle_id: &VehicleId) -> StoreResult<AggregateSummary> {
        recompute_vehicle(&mut self.repo, vehicle_id)
    }

    /// All events of a vehicle in ledger order.
    pub fn ledger(&self, vehicle_id: &VehicleId) -> StoreResult<Vec<StoredEvent>> {
        chronological(&self.repo, vehicle_id)
    }

    /// Totals and consumption for one calendar month.
    pub fn monthly(&self, request: &WindowRequest) -> Result<WindowStats, WindowError> {
        aggregate_window(&self.repo, request, self.config.anomaly_factor)
    }

    /// All twelve months of `year`, with year totals and the months whose
    /// consumption had to be estimated.
    pub fn year_overview(&self, vehicle_id: &VehicleId, year: i32) -> Result<YearOverview, WindowError> {
        aggregate_year(&self.repo, vehicle_id, year, self.config.anomaly_factor)
    }
}
