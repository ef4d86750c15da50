//! Schedule scenarios: fetch, minute matching, rate limiting and refresh.

use pawfeed::actuation::DispenseOutcome;
use pawfeed::app::events::{AppEvent, FeedSource};
use pawfeed::app::ports::CloudError;

use crate::mock_hw::{Rig, monday_at, schedule_doc};

fn triggered(e: &AppEvent) -> bool {
    matches!(e, AppEvent::ScheduleTriggered { .. })
}

#[test]
fn due_schedule_dispenses_once_per_minute() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![schedule_doc("breakfast", 1, 10, "08:00", &["M"])];
    rig.time.set_wall(Some(monday_at(8, 0)));
    let mut feeder = rig.operational();
    assert_eq!(feeder.schedules().len(), 1);

    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.sink.count(triggered), 1);
    assert!(rig.io.sink.events.contains(&AppEvent::Dispensed {
        source: FeedSource::Schedule,
        outcome: DispenseOutcome::Dispensed {
            bowl: 1,
            grams: 10,
            duration_ms: 500,
        },
    }));
    // park, open, close
    assert_eq!(rig.bowls[0].writes.borrow().len(), 3);
    assert_eq!(rig.bowls[1].writes.borrow().len(), 1);

    // Ticks inside the check interval do not re-evaluate.
    for _ in 0..20 {
        rig.time.advance_ms(100);
        feeder.tick(&mut rig.io);
    }
    assert_eq!(rig.io.sink.count(triggered), 1);

    // Next evaluation lands in 08:01.
    rig.time.advance_ms(60_000);
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.sink.count(triggered), 1);
    assert_eq!(feeder.actuation().dispense_count(), 1);
}

#[test]
fn unsynced_clock_defers_evaluation() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![schedule_doc("breakfast", 1, 10, "08:00", &["M"])];
    let mut feeder = rig.operational();

    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.sink.count(triggered), 0);

    rig.time.set_wall(Some(monday_at(8, 0)));
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.sink.count(triggered), 0, "still inside the check interval");

    rig.time.advance_ms(60_000);
    rig.time.set_wall(Some(monday_at(8, 0)));
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.sink.count(triggered), 1);
}

#[test]
fn only_matching_days_fire() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![
        schedule_doc("weekday", 1, 5, "08:00", &["T", "W", "R"]),
        schedule_doc("monday", 2, 5, "08:00", &["Mon"]),
    ];
    rig.time.set_wall(Some(monday_at(8, 0)));
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    let fired: Vec<&str> = rig
        .io
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::ScheduleTriggered { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec!["monday"]);
    assert_eq!(rig.bowls[1].writes.borrow().len(), 3);
}

#[test]
fn schedule_for_missing_bowl_moves_nothing() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![schedule_doc("ghost", 3, 10, "08:00", &["M"])];
    rig.time.set_wall(Some(monday_at(8, 0)));
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    assert!(rig.io.sink.events.contains(&AppEvent::Dispensed {
        source: FeedSource::Schedule,
        outcome: DispenseOutcome::UnknownBowl(3),
    }));
    assert!(rig.bowls.iter().all(|b| b.writes.borrow().len() == 1));
}

#[test]
fn malformed_documents_are_skipped() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![
        schedule_doc("broken", 1, 10, "25:00", &["M"]),
        schedule_doc("ok", 1, 10, "09:30", &["U"]),
    ];
    let feeder = rig.operational();

    assert_eq!(feeder.schedules().len(), 1);
    assert!(rig.io.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::SchedulesLoaded(report) if report.loaded == 1 && report.skipped == 1
    )));
}

#[test]
fn schedules_are_refreshed_hourly() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    assert_eq!(rig.io.cloud.list_calls, 1);

    rig.time.advance_ms(3_599_000);
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.list_calls, 1);

    rig.io.cloud.schedules = vec![schedule_doc("dinner", 2, 15, "18:00", &["M"])];
    rig.time.advance_ms(1_000);
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.list_calls, 2);
    assert_eq!(feeder.schedules().len(), 1);
}

#[test]
fn failed_refresh_keeps_cache_and_retries_sooner() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![schedule_doc("breakfast", 1, 10, "08:00", &["M"])];
    let mut feeder = rig.operational();

    rig.io.cloud.list_error = Some(CloudError::Timeout);
    rig.time.advance_ms(3_600_000);
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.list_calls, 2);
    assert_eq!(feeder.schedules().len(), 1);

    // Retry interval is one minute, not one hour.
    rig.io.cloud.list_error = None;
    rig.time.advance_ms(60_000);
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.list_calls, 3);
}
