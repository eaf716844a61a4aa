//! Vehicle summary rebuilt from the persisted event set.
//!
//! This pass does not replay anything: it sums the fields replay already
//! wrote, so it corrects drift left by the optimistic update at ingestion
//! or by an interrupted replay.

use crate::error::StoreResult;
use crate::model::{EventKind, StoredEvent, Vehicle, VehicleId, VehicleUpdate};
use crate::repository::{chronological, EventRepository};
use crate::round::{ratio, round2};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

/// Totals over a vehicle's whole ledger.
///
/// Totals exclude the vehicle's starting city/non-city offsets; those are
/// added when the summary is written back (see [`AggregateSummary::to_update`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub event_count: usize,
    pub current_odometer: f64,
    pub total_distance: f64,
    pub total_city_distance: f64,
    pub total_non_city_distance: f64,
    pub total_liters: f64,
    pub total_refuel_basis: f64,
    pub average_consumption: f64,
    pub last_refuel_date: Option<NaiveDate>,
    pub last_refuel_odometer: Option<f64>,
}

impl AggregateSummary {
    /// Summary fields to write onto `vehicle`.
    pub fn to_update(&self, vehicle: &Vehicle) -> VehicleUpdate {
        VehicleUpdate {
            current_odometer: Some(self.current_odometer),
            average_consumption: Some(self.average_consumption),
            cumulative_city_distance: Some(round2(
                vehicle.starting_city_distance + self.total_city_distance,
            )),
            cumulative_non_city_distance: Some(round2(
                vehicle.starting_non_city_distance + self.total_non_city_distance,
            )),
            last_refuel_date: Some(self.last_refuel_date),
            last_refuel_odometer: Some(self.last_refuel_odometer),
            ..VehicleUpdate::default()
        }
    }
}

/// Sum a vehicle's events. `events` may be in any order.
pub fn summarize(vehicle: &Vehicle, events: &[StoredEvent]) -> AggregateSummary {
    let mut ordered: Vec<&StoredEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.record.date, e.seq));

    let mut summary = AggregateSummary {
        event_count: ordered.len(),
        current_odometer: vehicle.starting_odometer,
        total_distance: 0.0,
        total_city_distance: 0.0,
        total_non_city_distance: 0.0,
        total_liters: 0.0,
        total_refuel_basis: 0.0,
        average_consumption: 0.0,
        last_refuel_date: None,
        last_refuel_odometer: None,
    };

    for event in ordered {
        let r = &event.record;
        summary.current_odometer = summary.current_odometer.max(r.odometer_total);
        summary.total_distance = round2(summary.total_distance + r.distance_driven);
        summary.total_city_distance = round2(summary.total_city_distance + r.city_distance);
        summary.total_non_city_distance =
            round2(summary.total_non_city_distance + r.non_city_distance);

        if event.kind == EventKind::Refueling {
            summary.total_liters = round2(summary.total_liters + r.liters_or_zero());
            summary.total_refuel_basis =
                round2(summary.total_refuel_basis + r.distance_basis.unwrap_or(0.0));
            summary.last_refuel_date = Some(r.date);
            summary.last_refuel_odometer = Some(r.odometer_total);
        }
    }

    summary.average_consumption =
        round2(ratio(summary.total_liters, summary.total_refuel_basis) * 100.0);
    summary
}

/// Recompute a vehicle's summary from the repository and write it back.
pub fn recompute_vehicle<R: EventRepository + ?Sized>(
    repo: &mut R,
    vehicle_id: &VehicleId,
) -> StoreResult<AggregateSummary> {
    let vehicle = repo.get_vehicle(vehicle_id)?;
    let events = chronological(&*repo, vehicle_id)?;
    let summary = summarize(&vehicle, &events);
    repo.update_vehicle(vehicle_id, &summary.to_update(&vehicle))?;
    debug!(
        "recomputed vehicle {vehicle_id}: odometer {}, average {} L/100km over {} events",
        summary.current_odometer, summary.average_consumption, summary.event_count
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventId, EventRecord};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn stored(kind: EventKind, seq: u64, record: EventRecord) -> StoredEvent {
        StoredEvent {
            id: EventId::generate(),
            kind,
            seq,
            record,
        }
    }

    fn replayed_refuel(d: u32, odo: f64, liters: f64, distance: f64, basis: f64) -> EventRecord {
        let mut r = EventRecord::refueling(day(d), odo, liters, 0.0, distance / 2.0);
        r.distance_driven = distance;
        r.non_city_distance = distance / 2.0;
        r.distance_basis = Some(basis);
        r
    }

    #[test]
    fn empty_ledger_keeps_starting_odometer() {
        let vehicle = Vehicle::new("v", "car", 50.0, 10_000.0, 20.0);
        let summary = summarize(&vehicle, &[]);
        assert_eq!(summary.current_odometer, 10_000.0);
        assert_eq!(summary.average_consumption, 0.0);
        assert_eq!(summary.last_refuel_odometer, None);
    }

    #[test]
    fn average_is_liters_over_refuel_basis() {
        let vehicle = Vehicle::new("v", "car", 50.0, 10_000.0, 20.0);
        let mut drive = EventRecord::distance_log(day(3), 10_100.0, 40.0);
        drive.distance_driven = 100.0;
        drive.non_city_distance = 60.0;
        let events = vec![
            stored(EventKind::Refueling, 0, replayed_refuel(1, 10_200.0, 15.0, 200.0, 200.0)),
            stored(EventKind::DistanceLog, 1, drive),
            stored(EventKind::Refueling, 2, replayed_refuel(9, 10_500.0, 21.0, 200.0, 300.0)),
        ];
        let summary = summarize(&vehicle, &events);
        assert_eq!(summary.total_liters, 36.0);
        assert_eq!(summary.total_refuel_basis, 500.0);
        assert_eq!(summary.average_consumption, 7.2);
        assert_eq!(summary.total_distance, 500.0);
        assert_eq!(summary.total_city_distance, 240.0);
        assert_eq!(summary.total_non_city_distance, 260.0);
        assert_eq!(summary.current_odometer, 10_500.0);
        assert_eq!(summary.last_refuel_date, Some(day(9)));
    }

    #[test]
    fn update_adds_starting_offsets() {
        let vehicle = Vehicle::new("v", "car", 50.0, 0.0, 20.0).with_starting_split(1_000.0, 500.0);
        let mut drive = EventRecord::distance_log(day(1), 100.0, 30.0);
        drive.distance_driven = 100.0;
        drive.non_city_distance = 70.0;
        let summary = summarize(&vehicle, &[stored(EventKind::DistanceLog, 0, drive)]);
        let update = summary.to_update(&vehicle);
        assert_eq!(update.cumulative_city_distance, Some(1_030.0));
        assert_eq!(update.cumulative_non_city_distance, Some(570.0));
        assert_eq!(update.last_refuel_odometer, Some(None));
    }
}
