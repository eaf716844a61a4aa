//! Ledger replay: derived per-event fields and the running tank level.

use crate::error::StoreError;
use crate::model::{
    BatchUpdate, EventKind, EventPatch, EventRecord, StoredEvent, Vehicle, VehicleId, VehicleUpdate,
};
use crate::recompute::{recompute_vehicle, AggregateSummary};
use crate::repository::{chronological, sort_chronologically, EventRepository};
use crate::round::{ratio, round2};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of replaying one vehicle's events in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPass {
    /// Events in ledger order with derived fields recomputed.
    pub events: Vec<StoredEvent>,
    /// Patches for the events whose derived fields changed.
    pub changes: Vec<BatchUpdate>,
    /// Tank level after the last event.
    pub tank_level: f64,
}

/// Recompute derived fields for `events`, starting from the vehicle's
/// starting odometer and tank level.
///
/// Fuel burnt between events is estimated from the vehicle's stored average
/// (or its city norm), since exact usage is only observable at refuelings.
/// Never fails: degenerate input yields zero distances and consumptions.
pub fn replay_events(vehicle: &Vehicle, events: &[StoredEvent]) -> ReplayPass {
    let mut events = events.to_vec();
    sort_chronologically(&mut events);

    let capacity = vehicle.tank_capacity.max(0.0);
    let rate = vehicle.estimation_rate();
    let mut previous_odometer = vehicle.starting_odometer;
    let mut last_refuel_odometer = vehicle.starting_odometer;
    let mut tank = round2(vehicle.starting_tank_level.clamp(0.0, capacity));
    let mut changes = Vec::new();

    for event in &mut events {
        let r = &mut event.record;
        let before = r.clone();

        let distance = round2((r.odometer_total - previous_odometer).max(0.0));
        let burnt = round2(distance * rate / 100.0);
        tank = round2((tank - burnt).max(0.0));

        r.distance_driven = distance;
        r.non_city_distance = round2((distance - r.city_distance).max(0.0));

        if event.kind == EventKind::Refueling {
            let basis = round2((r.odometer_total - last_refuel_odometer).max(0.0));
            let liters = r.liters_or_zero();
            let consumption = if basis > 0.0 && liters > 0.0 {
                round2(ratio(liters, basis) * 100.0)
            } else {
                0.0
            };
            tank = round2((tank + liters).min(capacity));
            last_refuel_odometer = r.odometer_total;
            r.distance_basis = Some(basis);
            r.consumption_per100 = Some(consumption);
        }

        r.tank_level_after = round2(tank);
        previous_odometer = r.odometer_total;

        let patch = derived_patch(&before, r, event.kind);
        if !patch.is_empty() {
            changes.push(BatchUpdate {
                vehicle_id: vehicle.id.clone(),
                kind: event.kind,
                event_id: event.id,
                patch,
            });
        }
    }

    ReplayPass {
        events,
        changes,
        tank_level: tank,
    }
}

fn derived_patch(before: &EventRecord, after: &EventRecord, kind: EventKind) -> EventPatch {
    fn changed(old: f64, new: f64) -> Option<f64> {
        (old != new).then_some(new)
    }
    let mut patch = EventPatch {
        distance_driven: changed(before.distance_driven, after.distance_driven),
        non_city_distance: changed(before.non_city_distance, after.non_city_distance),
        tank_level_after: changed(before.tank_level_after, after.tank_level_after),
        ..EventPatch::default()
    };
    if kind == EventKind::Refueling {
        if before.distance_basis != after.distance_basis {
            patch.distance_basis = after.distance_basis;
        }
        if before.consumption_per100 != after.consumption_per100 {
            patch.consumption_per100 = after.consumption_per100;
        }
    }
    patch
}

/// Step of a reconciliation that did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStage {
    /// Reading the vehicle or its events.
    Load,
    /// Writing recomputed event fields.
    WriteBack,
    /// Writing the final tank level.
    TankLevel,
    /// Rewriting the vehicle summary.
    Recompute,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileStage::Load => "load",
            ReconcileStage::WriteBack => "write-back",
            ReconcileStage::TankLevel => "tank level",
            ReconcileStage::Recompute => "recompute",
        })
    }
}

/// What a completed replay did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Events walked, in ledger order.
    pub events_replayed: usize,
    /// Events whose derived fields changed and were written back.
    pub events_rewritten: usize,
    pub batches_written: usize,
    /// Tank level after the last event, stored on the vehicle.
    pub tank_level: f64,
    /// Summary written by the closing recompute.
    pub summary: AggregateSummary,
}

/// Outcome of replay + recompute.
///
/// A stale outcome does not undo the write that triggered it: the event is
/// saved, but the derived fields or the vehicle summary may lag until the
/// next successful replay.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Every step succeeded.
    Reconciled(ReplayReport),
    /// A step failed; later steps did not run.
    Stale {
        stage: ReconcileStage,
        /// The underlying error, rendered.
        reason: String,
    },
}

impl Reconciliation {
    /// True when the ledger and summary are up to date.
    pub fn is_reconciled(&self) -> bool {
        matches!(self, Reconciliation::Reconciled(_))
    }

    pub fn report(&self) -> Option<&ReplayReport> {
        match self {
            Reconciliation::Reconciled(report) => Some(report),
            Reconciliation::Stale { .. } => None,
        }
    }

    fn stale(vehicle_id: &VehicleId, stage: ReconcileStage, err: StoreError) -> Self {
        warn!("replay of vehicle {vehicle_id} abandoned at {stage}: {err}");
        Reconciliation::Stale {
            stage,
            reason: err.to_string(),
        }
    }
}

/// Replay a vehicle from the repository, write back changed events in
/// batches of at most `batch_size`, store the final tank level and
/// recompute the summary.
///
/// Repository failures stop the pass where they occur. Earlier writes are
/// kept and the failure is returned as [`Reconciliation::Stale`].
pub fn replay_vehicle<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
    batch_size: usize,
) -> Reconciliation {
    let loaded = repo
        .get_vehicle(vehicle_id)
        .and_then(|v| chronological(&*repo, vehicle_id).map(|events| (v, events)));
    let (vehicle, events) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => return Reconciliation::stale(vehicle_id, ReconcileStage::Load, err),
    };

    let pass = replay_events(&vehicle, &events);
    debug!(
        "replayed {} events for vehicle {vehicle_id}, {} changed, tank {}",
        pass.events.len(),
        pass.changes.len(),
        pass.tank_level
    );

    let chunk = batch_size.min(repo.max_batch_size()).max(1);
    let mut batches_written = 0;
    for batch in pass.changes.chunks(chunk) {
        if let Err(err) = repo.batch_update(batch) {
            return Reconciliation::stale(vehicle_id, ReconcileStage::WriteBack, err);
        }
        batches_written += 1;
    }

    let tank_update = VehicleUpdate {
        current_tank_level: Some(pass.tank_level),
        ..VehicleUpdate::default()
    };
    if let Err(err) = repo.update_vehicle(vehicle_id, &tank_update) {
        return Reconciliation::stale(vehicle_id, ReconcileStage::TankLevel, err);
    }

    match recompute_vehicle(repo, vehicle_id) {
        Ok(summary) => Reconciliation::Reconciled(ReplayReport {
            events_replayed: pass.events.len(),
            events_rewritten: pass.changes.len(),
            batches_written,
            tank_level: pass.tank_level,
            summary,
        }),
        Err(err) => Reconciliation::stale(vehicle_id, ReconcileStage::Recompute, err),
    }
}
