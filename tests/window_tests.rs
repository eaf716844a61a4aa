mod common;

use common::{day, drive, engine_with, refuel, sedan, sedan_id};
use fleetfold::{
    Consumption, Engine, MemoryRepository, MonthWindow, StoreError, Vehicle, VehicleId,
    WindowError, WindowRequest,
};

fn month(m: u32) -> MonthWindow {
    MonthWindow::new(2024, m).unwrap()
}

/// January: 500 km on 35 L. February: a 10 km hop topped up with 5 L.
fn two_month_engine() -> Engine<MemoryRepository> {
    let mut engine = engine_with(sedan());
    let id = sedan_id();
    engine
        .record_refueling(&id, &refuel(day(1, 31), 10_500.0, 35.0, 100.0))
        .unwrap();
    engine
        .record_refueling(&id, &refuel(day(2, 1), 10_510.0, 5.0, 10.0))
        .unwrap();
    engine
}

#[test]
fn test_drive_only_month_estimates_from_norms() {
    let vehicle = Vehicle::new("van", "Transit", 70.0, 0.0, 40.0).with_norms(Some(8.0), Some(6.0));
    let mut engine = engine_with(vehicle);
    let id = VehicleId::from("van");
    engine.record_distance(&id, &drive(day(4, 10), 300.0, 100.0)).unwrap();

    let stats = engine.monthly(&WindowRequest::new("van", month(4))).unwrap();
    assert_eq!(stats.event_count, 1);
    assert_eq!(stats.totals.distance, 300.0);
    assert_eq!(stats.totals.city_distance, 100.0);
    assert_eq!(stats.totals.non_city_distance, 200.0);
    assert_eq!(stats.totals.liters, 0.0);
    assert_eq!(stats.consumption, Consumption::Estimated(6.67));
    assert!(stats.consumption.is_virtual());
}

#[test]
fn test_implausible_month_reports_reference() {
    let engine = two_month_engine();
    let id = sedan_id();
    let average = engine.vehicle(&id).unwrap().average_consumption;
    assert_eq!(average, 7.84);

    let feb = engine.monthly(&WindowRequest::new(id.clone(), month(2))).unwrap();
    assert_eq!(feb.totals.distance, 10.0);
    assert_eq!(feb.totals.liters, 5.0);
    assert_eq!(feb.consumption, Consumption::Estimated(7.84));
}

#[test]
fn test_plausible_month_is_measured() {
    let engine = two_month_engine();
    let jan = engine.monthly(&WindowRequest::new(sedan_id(), month(1))).unwrap();
    assert_eq!(jan.event_count, 1);
    assert_eq!(jan.totals.distance, 500.0);
    assert_eq!(jan.consumption, Consumption::Measured(7.0));
    assert!(!jan.consumption.is_virtual());
}

#[test]
fn test_tighter_factor_flags_more_months() {
    let mut engine = Engine::builder(MemoryRepository::new())
        .anomaly_factor(1.0)
        .build()
        .unwrap();
    engine.register_vehicle(sedan()).unwrap();
    let id = sedan_id();
    engine
        .record_refueling(&id, &refuel(day(1, 10), 10_500.0, 35.0, 0.0))
        .unwrap();
    engine
        .record_refueling(&id, &refuel(day(2, 10), 11_000.0, 45.0, 0.0))
        .unwrap();

    // February measured 9.0 against an overall average of 8.0
    let feb = engine.monthly(&WindowRequest::new(id, month(2))).unwrap();
    assert_eq!(feb.consumption, Consumption::Estimated(8.0));
}

#[test]
fn test_window_edges_and_end_state() {
    let engine = two_month_engine();
    let id = sedan_id();
    let ledger = engine.ledger(&id).unwrap();

    let jan = engine.monthly(&WindowRequest::new(id.clone(), month(1))).unwrap();
    assert_eq!(jan.max_odometer, Some(10_500.0));
    assert_eq!(jan.end_tank_level, Some(ledger[0].record.tank_level_after));

    let feb = engine.monthly(&WindowRequest::new(id, month(2))).unwrap();
    assert_eq!(feb.event_count, 1);
    assert_eq!(feb.max_odometer, Some(10_510.0));
    assert_eq!(feb.end_tank_level, Some(ledger[1].record.tank_level_after));
}

#[test]
fn test_empty_month() {
    let engine = two_month_engine();
    let stats = engine.monthly(&WindowRequest::new(sedan_id(), month(7))).unwrap();
    assert_eq!(stats.event_count, 0);
    assert_eq!(stats.totals.distance, 0.0);
    assert_eq!(stats.consumption, Consumption::Measured(0.0));
    assert_eq!(stats.max_odometer, None);
    assert_eq!(stats.end_tank_level, None);
}

#[test]
fn test_year_overview_adds_up() {
    let engine = two_month_engine();
    let id = sedan_id();
    let overview = engine.year_overview(&id, 2024).unwrap();

    assert_eq!(overview.months.len(), 12);
    assert_eq!(overview.months[0].window, month(1));
    assert_eq!(overview.months[11].window, month(12));
    let summed: f64 = overview.months.iter().map(|m| m.totals.distance).sum();
    assert_eq!(summed, overview.totals.distance);
    assert_eq!(overview.totals.distance, 510.0);
    assert_eq!(overview.totals.liters, 40.0);
    assert_eq!(overview.consumption, Consumption::Measured(7.84));

    let estimated: Vec<_> = overview.estimated_months().map(|m| m.window).collect();
    assert_eq!(estimated, vec![month(2)]);

    let previous = engine.year_overview(&id, 2023).unwrap();
    assert_eq!(previous.totals.distance, 0.0);
}

#[test]
fn test_invalid_and_unknown() {
    assert!(matches!(
        MonthWindow::new(2024, 13),
        Err(WindowError::InvalidWindow { month: 13, .. })
    ));

    let engine = two_month_engine();
    let err = engine
        .monthly(&WindowRequest::new("ghost", month(1)))
        .unwrap_err();
    assert!(matches!(err, WindowError::Store(StoreError::VehicleNotFound(_))));
}
