//! Validation and persistence of new, edited and deleted events.
//!
//! Every write here is followed by a full replay of the vehicle, whose
//! outcome is handed back to the caller alongside the write's own result.

use crate::error::IngestError;
use crate::model::{
    EventEdit, EventId, EventKind, EventPatch, EventRecord, Vehicle, VehicleId, VehicleUpdate,
};
use crate::repository::EventRepository;
use crate::replay::{replay_vehicle, Reconciliation};
use crate::round::{ratio, round2};
use chrono::NaiveDate;
use log::{info, warn};

/// A fuel purchase to record.
#[derive(Debug, Clone, PartialEq)]
pub struct RefuelingInput {
    pub date: NaiveDate,
    /// Total odometer reading at the pump.
    pub odometer_total: f64,
    pub liters: f64,
    pub price: f64,
    /// Part of the distance since the previous reading driven in town.
    pub city_distance: f64,
}

/// A drive without refueling.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceInput {
    pub date: NaiveDate,
    pub odometer_total: f64,
    pub city_distance: f64,
}

/// Returned by a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReceipt {
    pub event_id: EventId,
    /// Whether the follow-up replay completed. The event is saved either way.
    pub reconciliation: Reconciliation,
}

fn check_quantity(field: &'static str, value: f64) -> Result<(), IngestError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(IngestError::InvalidQuantity { field, value })
    }
}

/// Check a new reading against the vehicle and return the distance gap.
fn check_reading(vehicle: &Vehicle, odometer_total: f64, city_distance: f64) -> Result<f64, IngestError> {
    if !odometer_total.is_finite() || odometer_total <= vehicle.current_odometer {
        return Err(IngestError::InvalidOdometer {
            current: vehicle.current_odometer,
            attempted: odometer_total,
        });
    }
    check_quantity("city_distance", city_distance)?;
    let gap = round2(odometer_total - vehicle.current_odometer);
    if city_distance > gap {
        return Err(IngestError::InvalidDistanceSplit {
            gap,
            city: city_distance,
        });
    }
    Ok(gap)
}

/// Validate and append a refueling, then replay the vehicle.
pub fn record_refueling<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    input: &RefuelingInput,
    batch_size: usize,
) -> Result<IngestReceipt, IngestError> {
    check_quantity("liters", input.liters)?;
    check_quantity("price", input.price)?;
    let vehicle = repo.get_vehicle(vehicle_id)?;
    let gap = check_reading(&vehicle, input.odometer_total, input.city_distance)?;

    let basis = round2(input.odometer_total - vehicle.refuel_reference());
    let provisional = if basis > 0.0 && input.liters > 0.0 {
        round2(ratio(input.liters, basis) * 100.0)
    } else {
        0.0
    };

    let mut record = EventRecord::refueling(
        input.date,
        input.odometer_total,
        input.liters,
        input.price,
        input.city_distance,
    );
    record.distance_driven = gap;
    record.non_city_distance = round2(gap - input.city_distance);
    record.distance_basis = Some(basis);
    record.consumption_per100 = Some(provisional);

    let mut optimistic = optimistic_update(&vehicle, &record);
    if provisional > 0.0 {
        optimistic.average_consumption = Some(provisional);
    }
    optimistic.last_refuel_date = Some(Some(input.date));
    optimistic.last_refuel_odometer = Some(Some(input.odometer_total));

    ingest(repo, &vehicle, EventKind::Refueling, record, optimistic, batch_size)
}

/// Validate and append a drive-only reading, then replay the vehicle.
pub fn record_distance<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    input: &DistanceInput,
    batch_size: usize,
) -> Result<IngestReceipt, IngestError> {
    let vehicle = repo.get_vehicle(vehicle_id)?;
    let gap = check_reading(&vehicle, input.odometer_total, input.city_distance)?;

    let mut record = EventRecord::distance_log(input.date, input.odometer_total, input.city_distance);
    record.distance_driven = gap;
    record.non_city_distance = round2(gap - input.city_distance);

    let optimistic = optimistic_update(&vehicle, &record);
    ingest(repo, &vehicle, EventKind::DistanceLog, record, optimistic, batch_size)
}

fn optimistic_update(vehicle: &Vehicle, record: &EventRecord) -> VehicleUpdate {
    VehicleUpdate {
        current_odometer: Some(record.odometer_total),
        cumulative_city_distance: Some(round2(
            vehicle.cumulative_city_distance + record.city_distance,
        )),
        cumulative_non_city_distance: Some(round2(
            vehicle.cumulative_non_city_distance + record.non_city_distance,
        )),
        ..VehicleUpdate::default()
    }
}

fn ingest<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle: &Vehicle,
    kind: EventKind,
    record: EventRecord,
    optimistic: VehicleUpdate,
    batch_size: usize,
) -> Result<IngestReceipt, IngestError> {
    let odometer = record.odometer_total;
    let event_id = repo.append_event_if(&vehicle.id, kind, record, vehicle.version)?;
    info!("recorded {kind} {event_id} for vehicle {} at {odometer} km", vehicle.id);

    // The event is durable from here on; the summary is repaired by replay.
    if let Err(err) = repo.update_vehicle(&vehicle.id, &optimistic) {
        warn!("optimistic summary update for vehicle {} failed: {err}", vehicle.id);
    }

    let reconciliation = replay_vehicle(repo, &vehicle.id, batch_size);
    Ok(IngestReceipt {
        event_id,
        reconciliation,
    })
}

/// Change user-supplied fields of a stored event, then replay the vehicle.
///
/// Odometer ordering is not re-validated; replay orders events by date and
/// clamps backwards readings to zero distance.
pub fn edit_event<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    kind: EventKind,
    event_id: EventId,
    edit: EventEdit,
    batch_size: usize,
) -> Result<Reconciliation, IngestError> {
    if kind == EventKind::DistanceLog && (edit.liters.is_some() || edit.price.is_some()) {
        return Err(IngestError::FuelOnDistanceLog);
    }
    let checks = [
        ("odometer_total", edit.odometer_total),
        ("city_distance", edit.city_distance),
        ("liters", edit.liters),
        ("price", edit.price),
    ];
    for (field, value) in checks {
        if let Some(value) = value {
            check_quantity(field, value)?;
        }
    }

    let patch = EventPatch::from(edit);
    repo.update_event(vehicle_id, kind, event_id, &patch)?;
    info!("edited {kind} {event_id} for vehicle {vehicle_id}");
    Ok(replay_vehicle(repo, vehicle_id, batch_size))
}

/// Remove a stored event, then replay the vehicle.
pub fn delete_event<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    kind: EventKind,
    event_id: EventId,
    batch_size: usize,
) -> Result<Reconciliation, IngestError> {
    repo.delete_event(vehicle_id, kind, event_id)?;
    info!("deleted {kind} {event_id} for vehicle {vehicle_id}");
    Ok(replay_vehicle(repo, vehicle_id, batch_size))
}

/// Declared parameters shared by registration and settings updates.
fn check_vehicle_settings(vehicle: &Vehicle) -> Result<(), IngestError> {
    check_quantity("starting_odometer", vehicle.starting_odometer)?;
    check_quantity("tank_capacity", vehicle.tank_capacity)?;
    check_quantity("starting_tank_level", vehicle.starting_tank_level)?;
    if vehicle.starting_tank_level > vehicle.tank_capacity {
        return Err(IngestError::InvalidQuantity {
            field: "starting_tank_level",
            value: vehicle.starting_tank_level,
        });
    }
    let norms = [
        ("city_norm", vehicle.city_norm),
        ("non_city_norm", vehicle.non_city_norm),
    ];
    for (field, norm) in norms {
        if let Some(norm) = norm {
            check_quantity(field, norm)?;
        }
    }
    Ok(())
}

/// Register a vehicle. Its summary is reset to its starting values.
pub fn register_vehicle<R: EventRepository + ?Sized>(
    repo: &mut R,
    mut vehicle: Vehicle,
) -> Result<(), IngestError> {
    check_vehicle_settings(&vehicle)?;

    vehicle.current_odometer = vehicle.starting_odometer;
    vehicle.current_tank_level = vehicle.starting_tank_level;
    vehicle.average_consumption = 0.0;
    vehicle.cumulative_city_distance = vehicle.starting_city_distance;
    vehicle.cumulative_non_city_distance = vehicle.starting_non_city_distance;
    vehicle.last_refuel_date = None;
    vehicle.last_refuel_odometer = None;

    let id = vehicle.id.clone();
    repo.insert_vehicle(vehicle)?;
    info!("registered vehicle {id}");
    Ok(())
}

/// Change a vehicle's declared parameters, then replay it from the new
/// starting values.
pub fn update_vehicle_settings<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    update: &VehicleUpdate,
    batch_size: usize,
) -> Result<Reconciliation, IngestError> {
    let mut preview = repo.get_vehicle(vehicle_id)?;
    update.apply(&mut preview);
    check_vehicle_settings(&preview)?;

    repo.update_vehicle(vehicle_id, update)?;
    info!("updated settings of vehicle {vehicle_id}");
    Ok(replay_vehicle(repo, vehicle_id, batch_size))
}
