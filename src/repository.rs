use crate::error::{StoreError, StoreResult};
use crate::model::{
    BatchUpdate, EventId, EventKind, EventPatch, EventRecord, StoredEvent, Vehicle, VehicleId,
    VehicleUpdate,
};
use chrono::NaiveDate;

/// Storage seam for vehicles and their per-kind event logs.
///
/// Reads return events of one kind in insertion order. Every write that
/// touches a vehicle or one of its events bumps [`Vehicle::version`].
///
/// Implementations: [`MemoryRepository`](crate::MemoryRepository) and the
/// file-backed [`FileRepository`](crate::FileRepository).
pub trait EventRepository {
    /// Fetch a vehicle with its current summary.
    fn get_vehicle(&self, id: &VehicleId) -> StoreResult<Vehicle>;

    /// Register a new vehicle. Fails if the id is taken.
    fn insert_vehicle(&mut self, vehicle: Vehicle) -> StoreResult<()>;

    /// Apply a partial update and return the stored result.
    fn update_vehicle(&mut self, id: &VehicleId, update: &VehicleUpdate) -> StoreResult<Vehicle>;

    /// All events of one kind for a vehicle, in insertion order.
    fn list_events(&self, vehicle: &VehicleId, kind: EventKind) -> StoreResult<Vec<StoredEvent>>;

    /// Events of one kind dated within `from..=to`.
    fn list_events_between(
        &self,
        vehicle: &VehicleId,
        kind: EventKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<StoredEvent>> {
        let mut events = self.list_events(vehicle, kind)?;
        events.retain(|e| e.record.date >= from && e.record.date <= to);
        Ok(events)
    }

    /// Append an event and return its new id.
    fn append_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
    ) -> StoreResult<EventId>;

    /// Append only if the vehicle's version still equals `expected_version`.
    ///
    /// The default implementation checks then appends; stores that can do
    /// both under one write should override it.
    fn append_event_if(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
        expected_version: u64,
    ) -> StoreResult<EventId> {
        let actual = self.get_vehicle(vehicle)?.version;
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                vehicle: vehicle.clone(),
                expected: expected_version,
                actual,
            });
        }
        self.append_event(vehicle, kind, record)
    }

    /// Patch a stored event in place.
    fn update_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
        patch: &EventPatch,
    ) -> StoreResult<()>;

    /// Remove a stored event.
    fn delete_event(&mut self, vehicle: &VehicleId, kind: EventKind, id: EventId) -> StoreResult<()>;

    /// Largest batch [`batch_update`](Self::batch_update) accepts.
    fn max_batch_size(&self) -> usize;

    /// Apply a group of patches. Atomic for batches up to
    /// [`max_batch_size`](Self::max_batch_size) in stores that support it;
    /// the default applies them one by one.
    fn batch_update(&mut self, updates: &[BatchUpdate]) -> StoreResult<()> {
        let limit = self.max_batch_size();
        if updates.len() > limit {
            return Err(StoreError::BatchTooLarge {
                size: updates.len(),
                limit,
            });
        }
        for u in updates {
            self.update_event(&u.vehicle_id, u.kind, u.event_id, &u.patch)?;
        }
        Ok(())
    }
}

/// Both event kinds of a vehicle merged into ledger order: date ascending,
/// insertion order within a day.
pub fn chronological<R: EventRepository + ?Sized>(
    repo: &R,
    vehicle: &VehicleId,
) -> StoreResult<Vec<StoredEvent>> {
    let mut events = Vec::new();
    for kind in EventKind::ALL {
        events.extend(repo.list_events(vehicle, kind)?);
    }
    sort_chronologically(&mut events);
    Ok(events)
}

/// Stable date-then-insertion ordering, shared by replay and reporting.
pub(crate) fn sort_chronologically(events: &mut [StoredEvent]) {
    events.sort_by_key(|e| (e.record.date, e.seq));
}
