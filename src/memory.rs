//! In-memory ledger state and the repository built directly on it.
//!
//! Every mutation is expressed as a [`LedgerOp`] and folded into
//! [`LedgerState`] by [`LedgerState::apply`]. The file store journals the
//! same ops, so both repositories share one set of write semantics.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    BatchUpdate, EventId, EventKind, EventPatch, EventRecord, StoredEvent, Vehicle, VehicleId,
    VehicleUpdate,
};
use crate::repository::EventRepository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Batch limit used when none is configured, matching common document-store
/// write batch caps.
pub const DEFAULT_BATCH_LIMIT: usize = 500;

/// A single journaled write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum LedgerOp {
    /// Insert or replace a whole vehicle record.
    VehiclePut { vehicle: Vehicle },
    /// Insert or replace one event.
    EventPut {
        vehicle_id: VehicleId,
        event: StoredEvent,
    },
    EventDelete {
        vehicle_id: VehicleId,
        kind: EventKind,
        id: EventId,
    },
    /// Applied as a unit; journaled as a single line.
    Batch { ops: Vec<LedgerOp> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    events: BTreeMap<VehicleId, Vec<StoredEvent>>,
    next_seq: u64,
}

impl LedgerState {
    pub(crate) fn vehicle(&self, id: &VehicleId) -> StoreResult<&Vehicle> {
        self.vehicles
            .get(id)
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))
    }

    pub(crate) fn events(&self, id: &VehicleId, kind: EventKind) -> StoreResult<Vec<StoredEvent>> {
        self.vehicle(id)?;
        Ok(self
            .events
            .get(id)
            .map(|all| all.iter().filter(|e| e.kind == kind).cloned().collect())
            .unwrap_or_default())
    }

    pub(crate) fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    fn event(&self, vehicle: &VehicleId, kind: EventKind, id: EventId) -> StoreResult<&StoredEvent> {
        self.vehicle(vehicle)?;
        self.events
            .get(vehicle)
            .and_then(|all| all.iter().find(|e| e.id == id && e.kind == kind))
            .ok_or_else(|| StoreError::EventNotFound {
                vehicle: vehicle.clone(),
                kind,
                id,
            })
    }

    pub(crate) fn plan_insert_vehicle(&self, mut vehicle: Vehicle) -> StoreResult<LedgerOp> {
        if self.vehicles.contains_key(&vehicle.id) {
            return Err(StoreError::VehicleExists(vehicle.id));
        }
        vehicle.version = 0;
        Ok(LedgerOp::VehiclePut { vehicle })
    }

    pub(crate) fn plan_update_vehicle(
        &self,
        id: &VehicleId,
        update: &VehicleUpdate,
    ) -> StoreResult<LedgerOp> {
        let mut vehicle = self.vehicle(id)?.clone();
        update.apply(&mut vehicle);
        Ok(LedgerOp::VehiclePut { vehicle })
    }

    pub(crate) fn plan_append(
        &self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
        expected_version: Option<u64>,
    ) -> StoreResult<(EventId, LedgerOp)> {
        let actual = self.vehicle(vehicle)?.version;
        if let Some(expected) = expected_version {
            if expected != actual {
                return Err(StoreError::VersionConflict {
                    vehicle: vehicle.clone(),
                    expected,
                    actual,
                });
            }
        }
        let id = EventId::generate();
        let event = StoredEvent {
            id,
            kind,
            seq: self.next_seq,
            record,
        };
        Ok((
            id,
            LedgerOp::EventPut {
                vehicle_id: vehicle.clone(),
                event,
            },
        ))
    }

    pub(crate) fn plan_update_event(
        &self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
        patch: &EventPatch,
    ) -> StoreResult<LedgerOp> {
        let mut event = self.event(vehicle, kind, id)?.clone();
        event.record.apply(patch);
        Ok(LedgerOp::EventPut {
            vehicle_id: vehicle.clone(),
            event,
        })
    }

    pub(crate) fn plan_delete_event(
        &self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
    ) -> StoreResult<LedgerOp> {
        self.event(vehicle, kind, id)?;
        Ok(LedgerOp::EventDelete {
            vehicle_id: vehicle.clone(),
            kind,
            id,
        })
    }

    /// Plan a batch, merging repeated patches to the same event.
    pub(crate) fn plan_batch(&self, updates: &[BatchUpdate], limit: usize) -> StoreResult<LedgerOp> {
        if updates.len() > limit {
            return Err(StoreError::BatchTooLarge {
                size: updates.len(),
                limit,
            });
        }
        let mut ops: Vec<(VehicleId, StoredEvent)> = Vec::with_capacity(updates.len());
        for u in updates {
            let existing = ops
                .iter_mut()
                .find(|(v, e)| *v == u.vehicle_id && e.id == u.event_id && e.kind == u.kind);
            match existing {
                Some((_, event)) => event.record.apply(&u.patch),
                None => {
                    let mut event = self.event(&u.vehicle_id, u.kind, u.event_id)?.clone();
                    event.record.apply(&u.patch);
                    ops.push((u.vehicle_id.clone(), event));
                }
            }
        }
        Ok(LedgerOp::Batch {
            ops: ops
                .into_iter()
                .map(|(vehicle_id, event)| LedgerOp::EventPut { vehicle_id, event })
                .collect(),
        })
    }

    /// Fold one op into the state.
    pub(crate) fn apply(&mut self, op: LedgerOp) -> StoreResult<()> {
        match op {
            LedgerOp::VehiclePut { mut vehicle } => {
                if let Some(existing) = self.vehicles.get(&vehicle.id) {
                    vehicle.version = existing.version + 1;
                }
                self.vehicles.insert(vehicle.id.clone(), vehicle);
            }
            LedgerOp::EventPut { vehicle_id, event } => {
                self.bump(&vehicle_id)?;
                self.next_seq = self.next_seq.max(event.seq + 1);
                let all = self.events.entry(vehicle_id).or_default();
                match all.iter().position(|e| e.id == event.id) {
                    Some(i) => all[i].record = event.record,
                    None => all.push(event),
                }
            }
            LedgerOp::EventDelete {
                vehicle_id,
                kind,
                id,
            } => {
                self.bump(&vehicle_id)?;
                if let Some(all) = self.events.get_mut(&vehicle_id) {
                    all.retain(|e| !(e.id == id && e.kind == kind));
                }
            }
            LedgerOp::Batch { ops } => {
                for op in ops {
                    self.apply(op)?;
                }
            }
        }
        Ok(())
    }

    fn bump(&mut self, id: &VehicleId) -> StoreResult<()> {
        let vehicle = self
            .vehicles
            .get_mut(id)
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))?;
        vehicle.version += 1;
        Ok(())
    }
}

/// Repository held entirely in memory.
///
/// # Examples
///
/// ```
/// use fleetfold::{EventRepository, MemoryRepository, Vehicle, VehicleId};
///
/// let mut repo = MemoryRepository::new();
/// repo.insert_vehicle(Vehicle::new("van-1", "Transit", 80.0, 0.0, 40.0)).unwrap();
/// let van = repo.get_vehicle(&VehicleId::from("van-1")).unwrap();
/// assert_eq!(van.tank_capacity, 80.0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    state: LedgerState,
    batch_limit: usize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        MemoryRepository {
            state: LedgerState::default(),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Cap the size accepted by `batch_update`.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRepository for MemoryRepository {
    fn get_vehicle(&self, id: &VehicleId) -> StoreResult<Vehicle> {
        self.state.vehicle(id).cloned()
    }

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> StoreResult<()> {
        let op = self.state.plan_insert_vehicle(vehicle)?;
        self.state.apply(op)
    }

    fn update_vehicle(&mut self, id: &VehicleId, update: &VehicleUpdate) -> StoreResult<Vehicle> {
        let op = self.state.plan_update_vehicle(id, update)?;
        self.state.apply(op)?;
        self.get_vehicle(id)
    }

    fn list_events(&self, vehicle: &VehicleId, kind: EventKind) -> StoreResult<Vec<StoredEvent>> {
        self.state.events(vehicle, kind)
    }

    fn append_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
    ) -> StoreResult<EventId> {
        let (id, op) = self.state.plan_append(vehicle, kind, record, None)?;
        self.state.apply(op)?;
        Ok(id)
    }

    fn append_event_if(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
        expected_version: u64,
    ) -> StoreResult<EventId> {
        let (id, op) = self
            .state
            .plan_append(vehicle, kind, record, Some(expected_version))?;
        self.state.apply(op)?;
        Ok(id)
    }

    fn update_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
        patch: &EventPatch,
    ) -> StoreResult<()> {
        let op = self.state.plan_update_event(vehicle, kind, id, patch)?;
        self.state.apply(op)
    }

    fn delete_event(&mut self, vehicle: &VehicleId, kind: EventKind, id: EventId) -> StoreResult<()> {
        let op = self.state.plan_delete_event(vehicle, kind, id)?;
        self.state.apply(op)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }

    fn batch_update(&mut self, updates: &[BatchUpdate]) -> StoreResult<()> {
        let op = self.state.plan_batch(updates, self.batch_limit)?;
        self.state.apply(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn repo_with_van() -> (MemoryRepository, VehicleId) {
        let mut repo = MemoryRepository::new();
        repo.insert_vehicle(Vehicle::new("van", "Transit", 80.0, 1_000.0, 40.0))
            .unwrap();
        (repo, VehicleId::from("van"))
    }

    #[test]
    fn insert_twice_fails() {
        let (mut repo, _) = repo_with_van();
        let err = repo
            .insert_vehicle(Vehicle::new("van", "Other", 50.0, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, StoreError::VehicleExists(_)));
    }

    #[test]
    fn every_write_bumps_version() {
        let (mut repo, van) = repo_with_van();
        assert_eq!(repo.get_vehicle(&van).unwrap().version, 0);

        let id = repo
            .append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(1), 1_100.0, 0.0))
            .unwrap();
        assert_eq!(repo.get_vehicle(&van).unwrap().version, 1);

        repo.update_event(&van, EventKind::DistanceLog, id, &EventPatch::default())
            .unwrap();
        assert_eq!(repo.get_vehicle(&van).unwrap().version, 2);

        repo.update_vehicle(&van, &VehicleUpdate::default()).unwrap();
        assert_eq!(repo.get_vehicle(&van).unwrap().version, 3);

        repo.delete_event(&van, EventKind::DistanceLog, id).unwrap();
        assert_eq!(repo.get_vehicle(&van).unwrap().version, 4);
    }

    #[test]
    fn append_if_rejects_stale_version() {
        let (mut repo, van) = repo_with_van();
        repo.append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(1), 1_100.0, 0.0))
            .unwrap();

        let err = repo
            .append_event_if(
                &van,
                EventKind::DistanceLog,
                EventRecord::distance_log(day(2), 1_200.0, 0.0),
                0,
            )
            .unwrap_err();
        match err {
            StoreError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected VersionConflict, got {other}"),
        }
        assert_eq!(repo.list_events(&van, EventKind::DistanceLog).unwrap().len(), 1);
    }

    #[test]
    fn kinds_are_listed_separately() {
        let (mut repo, van) = repo_with_van();
        repo.append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(1), 1_100.0, 0.0))
            .unwrap();
        repo.append_event(
            &van,
            EventKind::Refueling,
            EventRecord::refueling(day(2), 1_200.0, 20.0, 30.0, 0.0),
        )
        .unwrap();
        let drives = repo.list_events(&van, EventKind::DistanceLog).unwrap();
        let refuels = repo.list_events(&van, EventKind::Refueling).unwrap();
        assert_eq!(drives.len(), 1);
        assert_eq!(refuels.len(), 1);
        assert!(refuels[0].seq > drives[0].seq);
    }

    #[test]
    fn update_with_wrong_kind_is_not_found() {
        let (mut repo, van) = repo_with_van();
        let id = repo
            .append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(1), 1_100.0, 0.0))
            .unwrap();
        let err = repo
            .update_event(&van, EventKind::Refueling, id, &EventPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::EventNotFound { .. }));
    }

    #[test]
    fn batch_respects_limit_and_merges_repeats() {
        let (repo, van) = repo_with_van();
        let mut repo = repo.with_batch_limit(2);
        let id = repo
            .append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(1), 1_100.0, 0.0))
            .unwrap();
        let update = |patch: EventPatch| BatchUpdate {
            vehicle_id: van.clone(),
            kind: EventKind::DistanceLog,
            event_id: id,
            patch,
        };

        let too_many = vec![
            update(EventPatch::default()),
            update(EventPatch::default()),
            update(EventPatch::default()),
        ];
        assert!(matches!(
            repo.batch_update(&too_many),
            Err(StoreError::BatchTooLarge { size: 3, limit: 2 })
        ));

        repo.batch_update(&[
            update(EventPatch {
                distance_driven: Some(100.0),
                ..EventPatch::default()
            }),
            update(EventPatch {
                tank_level_after: Some(33.0),
                ..EventPatch::default()
            }),
        ])
        .unwrap();
        let stored = &repo.list_events(&van, EventKind::DistanceLog).unwrap()[0];
        assert_eq!(stored.record.distance_driven, 100.0);
        assert_eq!(stored.record.tank_level_after, 33.0);
    }

    #[test]
    fn between_is_inclusive() {
        let (mut repo, van) = repo_with_van();
        for (d, odo) in [(1, 1_100.0), (15, 1_200.0), (31, 1_300.0)] {
            repo.append_event(&van, EventKind::DistanceLog, EventRecord::distance_log(day(d), odo, 0.0))
                .unwrap();
        }
        let hits = repo
            .list_events_between(&van, EventKind::DistanceLog, day(1), day(15))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }
}
