//! Plain data records exchanged with the repository.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a vehicle in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    /// Wrap any string; ids are opaque and compared exactly.
    pub fn new(id: impl Into<String>) -> Self {
        VehicleId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(value: &str) -> Self {
        VehicleId(value.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(value: String) -> Self {
        VehicleId(value)
    }
}

/// Identifier of a stored event, assigned by the repository on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn generate() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two event kinds that make up a vehicle's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Fuel was purchased; carries liters and price.
    Refueling,
    /// Odometer-only drive, no fuel purchased.
    DistanceLog,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Refueling, EventKind::DistanceLog];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Refueling => "refueling",
            EventKind::DistanceLog => "distance_log",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle with its declared parameters and its derived summary snapshot.
///
/// The summary fields (`current_*`, `average_consumption`, `cumulative_*`,
/// `last_refuel_*`) are a cache. They can always be rebuilt by replaying
/// the vehicle's events from the `starting_*` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: VehicleId,
    pub label: String,
    pub tank_capacity: f64,
    pub starting_odometer: f64,
    pub starting_tank_level: f64,
    #[serde(default)]
    pub starting_city_distance: f64,
    #[serde(default)]
    pub starting_non_city_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_norm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_city_norm: Option<f64>,

    pub current_odometer: f64,
    pub current_tank_level: f64,
    #[serde(default)]
    pub average_consumption: f64,
    #[serde(default)]
    pub cumulative_city_distance: f64,
    #[serde(default)]
    pub cumulative_non_city_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refuel_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refuel_odometer: Option<f64>,

    /// Optimistic concurrency token. Bumped by the repository on every write
    /// that touches this vehicle or one of its events.
    #[serde(default)]
    pub version: u64,
}

impl Vehicle {
    /// Create a vehicle whose summary mirrors its starting values.
    ///
    /// # Examples
    ///
    /// ```
    /// use fleetfold::Vehicle;
    ///
    /// let v = Vehicle::new("car-1", "Skoda Octavia", 50.0, 10_000.0, 20.0)
    ///     .with_norms(Some(8.0), Some(6.0));
    /// assert_eq!(v.current_odometer, 10_000.0);
    /// assert_eq!(v.current_tank_level, 20.0);
    /// assert_eq!(v.version, 0);
    /// ```
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        tank_capacity: f64,
        starting_odometer: f64,
        starting_tank_level: f64,
    ) -> Self {
        Vehicle {
            id: VehicleId(id.into()),
            label: label.into(),
            tank_capacity,
            starting_odometer,
            starting_tank_level,
            starting_city_distance: 0.0,
            starting_non_city_distance: 0.0,
            city_norm: None,
            non_city_norm: None,
            current_odometer: starting_odometer,
            current_tank_level: starting_tank_level,
            average_consumption: 0.0,
            cumulative_city_distance: 0.0,
            cumulative_non_city_distance: 0.0,
            last_refuel_date: None,
            last_refuel_odometer: None,
            version: 0,
        }
    }

    /// Set the declared city and non-city norms (L/100km).
    pub fn with_norms(mut self, city: Option<f64>, non_city: Option<f64>) -> Self {
        self.city_norm = city;
        self.non_city_norm = non_city;
        self
    }

    /// Set the city/non-city distance already driven before the ledger starts.
    pub fn with_starting_split(mut self, city: f64, non_city: f64) -> Self {
        self.starting_city_distance = city;
        self.starting_non_city_distance = non_city;
        self.cumulative_city_distance = city;
        self.cumulative_non_city_distance = non_city;
        self
    }

    /// Odometer from which the next refueling's distance basis is measured.
    pub fn refuel_reference(&self) -> f64 {
        self.last_refuel_odometer.unwrap_or(self.starting_odometer)
    }

    /// Consumption used to estimate fuel burnt between events: the measured
    /// average when known, else the declared city norm, else zero.
    pub fn estimation_rate(&self) -> f64 {
        if self.average_consumption > 0.0 {
            self.average_consumption
        } else {
            self.city_norm.filter(|n| *n > 0.0).unwrap_or(0.0)
        }
    }
}

/// One ledger entry, as persisted.
///
/// `liters`, `price`, `consumption_per100` and `distance_basis` are only
/// present on refuelings. `non_city_distance`, `distance_driven`,
/// `distance_basis`, `consumption_per100` and `tank_level_after` are written
/// by replay and are not trusted as input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub date: NaiveDate,
    pub odometer_total: f64,
    #[serde(default)]
    pub city_distance: f64,
    #[serde(default)]
    pub non_city_distance: f64,
    #[serde(default)]
    pub distance_driven: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_per100: Option<f64>,
    #[serde(default)]
    pub tank_level_after: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_basis: Option<f64>,
}

impl EventRecord {
    /// A refueling record with no derived fields filled in yet.
    pub fn refueling(
        date: NaiveDate,
        odometer_total: f64,
        liters: f64,
        price: f64,
        city_distance: f64,
    ) -> Self {
        EventRecord {
            liters: Some(liters),
            price: Some(price),
            ..EventRecord::distance_log(date, odometer_total, city_distance)
        }
    }

    /// A drive-only record with no derived fields filled in yet.
    pub fn distance_log(date: NaiveDate, odometer_total: f64, city_distance: f64) -> Self {
        EventRecord {
            date,
            odometer_total,
            city_distance,
            non_city_distance: 0.0,
            distance_driven: 0.0,
            liters: None,
            price: None,
            consumption_per100: None,
            tank_level_after: 0.0,
            distance_basis: None,
        }
    }

    /// Liters purchased, zero for drive-only records.
    pub fn liters_or_zero(&self) -> f64 {
        self.liters.unwrap_or(0.0)
    }

    /// Apply a patch in place. Absent fields are left untouched.
    pub fn apply(&mut self, patch: &EventPatch) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(v) = patch.odometer_total {
            self.odometer_total = v;
        }
        if let Some(v) = patch.city_distance {
            self.city_distance = v;
        }
        if let Some(v) = patch.non_city_distance {
            self.non_city_distance = v;
        }
        if let Some(v) = patch.distance_driven {
            self.distance_driven = v;
        }
        if let Some(v) = patch.liters {
            self.liters = Some(v);
        }
        if let Some(v) = patch.price {
            self.price = Some(v);
        }
        if let Some(v) = patch.consumption_per100 {
            self.consumption_per100 = Some(v);
        }
        if let Some(v) = patch.tank_level_after {
            self.tank_level_after = v;
        }
        if let Some(v) = patch.distance_basis {
            self.distance_basis = Some(v);
        }
    }
}

/// An event as returned by the repository: its id, kind and record.
///
/// `seq` is the repository-wide insertion counter; it breaks ties between
/// events that share a date, across both kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub seq: u64,
    pub record: EventRecord,
}

/// Partial update of an [`EventRecord`]. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometer_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_city_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_driven: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_per100: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tank_level_after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_basis: Option<f64>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }
}

/// User-editable fields of an existing event.
///
/// Derived fields are deliberately absent; replay owns them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventEdit {
    pub date: Option<NaiveDate>,
    pub odometer_total: Option<f64>,
    pub city_distance: Option<f64>,
    pub liters: Option<f64>,
    pub price: Option<f64>,
}

impl From<EventEdit> for EventPatch {
    fn from(edit: EventEdit) -> Self {
        EventPatch {
            date: edit.date,
            odometer_total: edit.odometer_total,
            city_distance: edit.city_distance,
            liters: edit.liters,
            price: edit.price,
            ..EventPatch::default()
        }
    }
}

/// One entry of a repository batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub vehicle_id: VehicleId,
    pub kind: EventKind,
    pub event_id: EventId,
    pub patch: EventPatch,
}

/// Partial update of a [`Vehicle`]. `None` means "leave as is".
///
/// `last_refuel_date` and `last_refuel_odometer` are doubly optional so a
/// recompute over a ledger with no refuelings can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleUpdate {
    pub label: Option<String>,
    pub tank_capacity: Option<f64>,
    pub starting_odometer: Option<f64>,
    pub starting_tank_level: Option<f64>,
    pub starting_city_distance: Option<f64>,
    pub starting_non_city_distance: Option<f64>,
    pub city_norm: Option<Option<f64>>,
    pub non_city_norm: Option<Option<f64>>,
    pub current_odometer: Option<f64>,
    pub current_tank_level: Option<f64>,
    pub average_consumption: Option<f64>,
    pub cumulative_city_distance: Option<f64>,
    pub cumulative_non_city_distance: Option<f64>,
    pub last_refuel_date: Option<Option<NaiveDate>>,
    pub last_refuel_odometer: Option<Option<f64>>,
}

impl VehicleUpdate {
    /// Apply in place. Does not touch `version`; that is the repository's job.
    pub fn apply(&self, vehicle: &mut Vehicle) {
        if let Some(v) = &self.label {
            vehicle.label = v.clone();
        }
        if let Some(v) = self.tank_capacity {
            vehicle.tank_capacity = v;
        }
        if let Some(v) = self.starting_odometer {
            vehicle.starting_odometer = v;
        }
        if let Some(v) = self.starting_tank_level {
            vehicle.starting_tank_level = v;
        }
        if let Some(v) = self.starting_city_distance {
            vehicle.starting_city_distance = v;
        }
        if let Some(v) = self.starting_non_city_distance {
            vehicle.starting_non_city_distance = v;
        }
        if let Some(v) = self.city_norm {
            vehicle.city_norm = v;
        }
        if let Some(v) = self.non_city_norm {
            vehicle.non_city_norm = v;
        }
        if let Some(v) = self.current_odometer {
            vehicle.current_odometer = v;
        }
        if let Some(v) = self.current_tank_level {
            vehicle.current_tank_level = v;
        }
        if let Some(v) = self.average_consumption {
            vehicle.average_consumption = v;
        }
        if let Some(v) = self.cumulative_city_distance {
            vehicle.cumulative_city_distance = v;
        }
        if let Some(v) = self.cumulative_non_city_distance {
            vehicle.cumulative_non_city_distance = v;
        }
        if let Some(v) = self.last_refuel_date {
            vehicle.last_refuel_date = v;
        }
        if let Some(v) = self.last_refuel_odometer {
            vehicle.last_refuel_odometer = v;
        }
    }
}
