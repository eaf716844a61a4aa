//! Calendar-month statistics with an estimated-consumption fallback.

use crate::error::WindowError;
use crate::model::{EventKind, StoredEvent, Vehicle, VehicleId};
use crate::repository::{sort_chronologically, EventRepository};
use crate::round::{ratio, round2};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar month. Deserializing goes through [`MonthWindow::new`], so
/// an out-of-range month is rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonth")]
pub struct MonthWindow {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawMonth {
    year: i32,
    month: u32,
}

impl TryFrom<RawMonth> for MonthWindow {
    type Error = WindowError;

    fn try_from(raw: RawMonth) -> Result<Self, Self::Error> {
        MonthWindow::new(raw.year, raw.month)
    }
}

impl MonthWindow {
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidWindow`] if `month` is not in `1..=12`
    /// or the year is outside chrono's range.
    pub fn new(year: i32, month: u32) -> Result<Self, WindowError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(WindowError::InvalidWindow { year, month });
        }
        Ok(MonthWindow { year, month })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        MonthWindow {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Parameters of one window query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub vehicle_id: VehicleId,
    pub window: MonthWindow,
}

impl WindowRequest {
    pub fn new(vehicle_id: impl Into<VehicleId>, window: MonthWindow) -> Self {
        WindowRequest {
            vehicle_id: vehicle_id.into(),
            window,
        }
    }
}

/// A consumption figure in L/100km, tagged by where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Consumption {
    /// Computed from fuel actually purchased in the window.
    Measured(f64),
    /// Substituted because fuel data was missing or implausible.
    Estimated(f64),
}

impl Consumption {
    pub fn value(&self) -> f64 {
        match *self {
            Consumption::Measured(v) | Consumption::Estimated(v) => v,
        }
    }

    /// True for estimates ("virtual" consumption).
    pub fn is_virtual(&self) -> bool {
        matches!(self, Consumption::Estimated(_))
    }
}

/// Totals observed in a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowTotals {
    pub distance: f64,
    pub liters: f64,
    pub city_distance: f64,
    pub non_city_distance: f64,
}

/// Pick the consumption figure to show for a window.
///
/// `anomaly_factor` bounds how far a measured figure may exceed the
/// vehicle's reference before it is replaced by the reference.
pub fn window_consumption(vehicle: &Vehicle, totals: &WindowTotals, anomaly_factor: f64) -> Consumption {
    if totals.distance <= 0.0 {
        return Consumption::Measured(0.0);
    }

    let reference = vehicle.estimation_rate();

    if totals.liters > 0.0 {
        let monthly = ratio(totals.liters, totals.distance) * 100.0;
        if reference > 0.0 && monthly > reference * anomaly_factor {
            return Consumption::Estimated(round2(reference));
        }
        return Consumption::Measured(round2(monthly));
    }

    if vehicle.average_consumption > 0.0 {
        return Consumption::Estimated(round2(vehicle.average_consumption));
    }

    let city_norm = vehicle.city_norm.or(vehicle.non_city_norm).unwrap_or(0.0);
    let non_city_norm = vehicle.non_city_norm.or(vehicle.city_norm).unwrap_or(0.0);
    let liters = round2(
        (totals.city_distance * city_norm + totals.non_city_distance * non_city_norm) / 100.0,
    );
    Consumption::Estimated(round2(ratio(liters, totals.distance) * 100.0))
}

/// Statistics for one vehicle and month.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub window: MonthWindow,
    pub event_count: usize,
    pub totals: WindowTotals,
    /// Highest odometer reading in the window.
    pub max_odometer: Option<f64>,
    /// Tank level after the window's last event.
    pub end_tank_level: Option<f64>,
    pub consumption: Consumption,
}

/// Fold a vehicle's in-window events into statistics.
///
/// Events outside `window` are ignored, so the full ledger may be passed.
pub fn summarize_window(
    vehicle: &Vehicle,
    window: MonthWindow,
    events: &[StoredEvent],
    anomaly_factor: f64,
) -> WindowStats {
    let mut in_window: Vec<StoredEvent> = events
        .iter()
        .filter(|e| window.contains(e.record.date))
        .cloned()
        .collect();
    sort_chronologically(&mut in_window);

    let mut totals = WindowTotals::default();
    let mut max_odometer: Option<f64> = None;
    for event in &in_window {
        let r = &event.record;
        totals.distance = round2(totals.distance + r.distance_driven);
        totals.city_distance = round2(totals.city_distance + r.city_distance);
        totals.non_city_distance = round2(totals.non_city_distance + r.non_city_distance);
        if event.kind == EventKind::Refueling {
            totals.liters = round2(totals.liters + r.liters_or_zero());
        }
        max_odometer = Some(max_odometer.map_or(r.odometer_total, |m| m.max(r.odometer_total)));
    }

    WindowStats {
        window,
        event_count: in_window.len(),
        totals,
        max_odometer,
        end_tank_level: in_window.last().map(|e| e.record.tank_level_after),
        consumption: window_consumption(vehicle, &totals, anomaly_factor),
    }
}

/// Load a vehicle's events for the requested month and summarize them.
pub fn aggregate_window<R: EventRepository + ?Sized>(
    repo: &R,
    request: &WindowRequest,
    anomaly_factor: f64,
) -> Result<WindowStats, WindowError> {
    let vehicle = repo.get_vehicle(&request.vehicle_id)?;
    let (from, to) = (request.window.first_day(), request.window.last_day());
    let mut events = Vec::new();
    for kind in EventKind::ALL {
        events.extend(repo.list_events_between(&request.vehicle_id, kind, from, to)?);
    }
    Ok(summarize_window(&vehicle, request.window, &events, anomaly_factor))
}

/// Twelve monthly windows of one year and their combined totals.
#[derive(Debug, Clone, PartialEq)]
pub struct YearOverview {
    pub year: i32,
    pub months: Vec<WindowStats>,
    pub totals: WindowTotals,
    pub consumption: Consumption,
}

impl YearOverview {
    /// Months whose consumption had to be estimated.
    pub fn estimated_months(&self) -> impl Iterator<Item = &WindowStats> {
        self.months.iter().filter(|m| m.consumption.is_virtual())
    }
}

/// Build a [`YearOverview`] from a single read of the vehicle's events.
pub fn aggregate_year<R: EventRepository + ?Sized>(
    repo: &R,
    vehicle_id: &VehicleId,
    year: i32,
    anomaly_factor: f64,
) -> Result<YearOverview, WindowError> {
    let first = MonthWindow::new(year, 1)?;
    let last = MonthWindow::new(year, 12)?;
    let vehicle = repo.get_vehicle(vehicle_id)?;
    let mut events = Vec::new();
    for kind in EventKind::ALL {
        events.extend(repo.list_events_between(vehicle_id, kind, first.first_day(), last.last_day())?);
    }

    let mut months = Vec::with_capacity(12);
    let mut totals = WindowTotals::default();
    for month in 1..=12 {
        let stats = summarize_window(&vehicle, MonthWindow { year, month }, &events, anomaly_factor);
        totals.distance = round2(totals.distance + stats.totals.distance);
        totals.liters = round2(totals.liters + stats.totals.liters);
        totals.city_distance = round2(totals.city_distance + stats.totals.city_distance);
        totals.non_city_distance = round2(totals.non_city_distance + stats.totals.non_city_distance);
        months.push(stats);
    }

    Ok(YearOverview {
        year,
        consumption: window_consumption(&vehicle, &totals, anomaly_factor),
        months,
        totals,
    })
}
