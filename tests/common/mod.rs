#![allow(dead_code)]

use chrono::NaiveDate;
use fleetfold::{
    BatchUpdate, DistanceInput, Engine, EventId, EventKind, EventPatch, EventRecord,
    EventRepository, MemoryRepository, RefuelingInput, StoreError, StoreResult, StoredEvent,
    Vehicle, VehicleId, VehicleUpdate,
};
use std::io;

pub fn day(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, d).unwrap()
}

/// 50 L tank, 20 L in it, odometer at 10 000 km.
pub fn sedan() -> Vehicle {
    Vehicle::new("sedan", "Octavia", 50.0, 10_000.0, 20.0)
}

pub fn sedan_id() -> VehicleId {
    VehicleId::from("sedan")
}

pub fn engine_with(vehicle: Vehicle) -> Engine<MemoryRepository> {
    let mut engine = Engine::new(MemoryRepository::new());
    engine.register_vehicle(vehicle).unwrap();
    engine
}

pub fn refuel(date: NaiveDate, odometer_total: f64, liters: f64, city_distance: f64) -> RefuelingInput {
    RefuelingInput {
        date,
        odometer_total,
        liters,
        price: liters * 1.6,
        city_distance,
    }
}

pub fn drive(date: NaiveDate, odometer_total: f64, city_distance: f64) -> DistanceInput {
    DistanceInput {
        date,
        odometer_total,
        city_distance,
    }
}

/// Wraps a [`MemoryRepository`] and injects failures on demand.
#[derive(Debug, Default)]
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    pub fail_batches: bool,
    pub fail_vehicle_updates: bool,
    /// Report a version one behind the stored one, as a reader racing a
    /// concurrent writer would see it.
    pub stale_reads: bool,
}

fn injected(what: &str) -> StoreError {
    StoreError::Io(io::Error::other(format!("injected {what} failure")))
}

impl EventRepository for FlakyRepository {
    fn get_vehicle(&self, id: &VehicleId) -> StoreResult<Vehicle> {
        let mut vehicle = self.inner.get_vehicle(id)?;
        if self.stale_reads {
            vehicle.version = vehicle.version.wrapping_sub(1);
        }
        Ok(vehicle)
    }

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> StoreResult<()> {
        self.inner.insert_vehicle(vehicle)
    }

    fn update_vehicle(&mut self, id: &VehicleId, update: &VehicleUpdate) -> StoreResult<Vehicle> {
        if self.fail_vehicle_updates {
            return Err(injected("vehicle update"));
        }
        self.inner.update_vehicle(id, update)
    }

    fn list_events(&self, vehicle: &VehicleId, kind: EventKind) -> StoreResult<Vec<StoredEvent>> {
        self.inner.list_events(vehicle, kind)
    }

    fn append_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
    ) -> StoreResult<EventId> {
        self.inner.append_event(vehicle, kind, record)
    }

    fn append_event_if(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
        expected_version: u64,
    ) -> StoreResult<EventId> {
        self.inner.append_event_if(vehicle, kind, record, expected_version)
    }

    fn update_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
        patch: &EventPatch,
    ) -> StoreResult<()> {
        self.inner.update_event(vehicle, kind, id, patch)
    }

    fn delete_event(&mut self, vehicle: &VehicleId, kind: EventKind, id: EventId) -> StoreResult<()> {
        self.inner.delete_event(vehicle, kind, id)
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    fn batch_update(&mut self, updates: &[BatchUpdate]) -> StoreResult<()> {
        if self.fail_batches {
            return Err(injected("batch"));
        }
        self.inner.batch_update(updates)
    }
}
