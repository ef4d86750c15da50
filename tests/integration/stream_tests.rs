//! Command stream scenarios: feeds, de-duplication, refetch and reconnect.

use pawfeed::actuation::DispenseOutcome;
use pawfeed::app::events::{AppEvent, FeedSource};
use pawfeed::cloud::rtdb::StreamEvent;
use pawfeed::fsm::StateId;
use serde_json::json;

use crate::mock_hw::{Rig, monday_at, schedule_doc};

fn command_dispenses(rig: &Rig) -> Vec<u64> {
    rig.io
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Dispensed {
                source: FeedSource::Command { timestamp },
                ..
            } => Some(*timestamp),
            _ => None,
        })
        .collect()
}

#[test]
fn feed_command_dispenses_and_clears_node() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io); // opens the stream
    assert_eq!(rig.io.cloud.stream_paths, vec!["/commands/F1".to_owned()]);

    rig.io.cloud.push_command(json!({
        "command": "feed",
        "timestamp": 1_700_000_000_000u64,
        "bowl": 2,
        "amount": 12
    }));
    let before = rig.time.uptime_ms();
    feeder.tick(&mut rig.io);

    assert!(rig.io.sink.events.contains(&AppEvent::FeedAccepted {
        timestamp: 1_700_000_000_000,
        bowl: 2,
        grams: 12,
    }));
    assert!(rig.io.sink.events.contains(&AppEvent::Dispensed {
        source: FeedSource::Command {
            timestamp: 1_700_000_000_000
        },
        outcome: DispenseOutcome::Dispensed {
            bowl: 2,
            grams: 12,
            duration_ms: 600,
        },
    }));
    assert_eq!(rig.time.uptime_ms() - before, 600);
    assert_eq!(rig.io.cloud.deleted, vec!["/commands/F1".to_owned()]);
    assert_eq!(feeder.commands().last_processed_timestamp(), 1_700_000_000_000);
}

#[test]
fn replayed_and_older_commands_are_ignored() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    let feed = |ts: u64| json!({"command": "feed", "timestamp": ts, "bowl": 1, "amount": 5});
    rig.io.cloud.push_command(feed(200));
    feeder.tick(&mut rig.io);
    // Stream reconnects often replay the node.
    rig.io.cloud.push_command(feed(200));
    feeder.tick(&mut rig.io);
    rig.io.cloud.push_command(feed(150));
    feeder.tick(&mut rig.io);
    rig.io.cloud.push_command(feed(201));
    feeder.tick(&mut rig.io);

    assert_eq!(command_dispenses(&rig), vec![200, 201]);
    assert_eq!(feeder.actuation().dispense_count(), 2);
}

#[test]
fn burst_keeps_only_the_newest_feed() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    let put = |ts: u64, bowl: u32| StreamEvent::Put {
        path: "/".into(),
        data: json!({"command": "feed", "timestamp": ts, "bowl": bowl, "amount": 5}),
    };
    rig.io.cloud.push_events(vec![put(10, 1), put(11, 2)]);
    feeder.tick(&mut rig.io);

    assert_eq!(command_dispenses(&rig), vec![11]);
    assert_eq!(rig.bowls[0].writes.borrow().len(), 1);
    assert_eq!(rig.bowls[1].writes.borrow().len(), 3);
}

#[test]
fn invalid_feeds_are_dropped_without_consuming_the_timestamp() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    rig.io
        .cloud
        .push_command(json!({"command": "feed", "timestamp": 50, "bowl": 0, "amount": 5}));
    feeder.tick(&mut rig.io);
    rig.io
        .cloud
        .push_command(json!({"command": "feed", "timestamp": 51, "bowl": 1}));
    feeder.tick(&mut rig.io);
    rig.io.cloud.push_command(json!({"bowl": 1, "amount": 5}));
    feeder.tick(&mut rig.io);

    assert!(command_dispenses(&rig).is_empty());
    assert_eq!(feeder.commands().last_processed_timestamp(), 0);
    assert!(rig.io.cloud.deleted.is_empty());

    rig.io
        .cloud
        .push_command(json!({"command": "feed", "timestamp": 50, "bowl": 1, "amount": 5}));
    feeder.tick(&mut rig.io);
    assert_eq!(command_dispenses(&rig), vec![50]);
}

#[test]
fn refetch_command_reloads_schedules_and_clears_node() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);
    assert!(feeder.schedules().is_empty());

    rig.io.cloud.schedules = vec![schedule_doc("lunch", 1, 8, "12:00", &["M", "F"])];
    rig.io
        .cloud
        .push_command(json!({"command": "refetch_schedules", "timestamp": 5}));
    feeder.tick(&mut rig.io);

    assert_eq!(feeder.schedules().len(), 1);
    assert_eq!(rig.io.cloud.list_calls, 2);
    assert_eq!(rig.io.cloud.nulled, vec!["/commands/F1".to_owned()]);
    assert!(rig.io.cloud.deleted.is_empty());
}

#[test]
fn unknown_commands_and_child_updates_do_nothing() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    rig.io.cloud.push_command(json!({"command": "sing", "timestamp": 9}));
    rig.io.cloud.push_events(vec![
        StreamEvent::KeepAlive,
        StreamEvent::Patch {
            path: "/bowl".into(),
            data: json!(2),
        },
        StreamEvent::Put {
            path: "/".into(),
            data: serde_json::Value::Null,
        },
    ]);
    feeder.tick(&mut rig.io);
    feeder.tick(&mut rig.io);

    assert!(command_dispenses(&rig).is_empty());
    assert!(rig.io.cloud.deleted.is_empty());
    assert!(rig.io.cloud.nulled.is_empty());
}

#[test]
fn dropped_stream_is_reopened_next_tick() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    rig.io.cloud.push_events(vec![StreamEvent::Timeout]);
    feeder.tick(&mut rig.io);
    assert!(rig.io.sink.events.contains(&AppEvent::StreamLost));

    feeder.tick(&mut rig.io);
    rig.io.cloud.push_failure();
    feeder.tick(&mut rig.io);
    feeder.tick(&mut rig.io);

    assert_eq!(rig.io.cloud.stream_paths.len(), 3);
    assert_eq!(feeder.commands().opened_count(), 3);
    assert!(
        rig.io
            .sink
            .events
            .contains(&AppEvent::StreamConnected { reconnect: true })
    );

    // Ordering survives reconnects.
    rig.io
        .cloud
        .push_command(json!({"command": "feed", "timestamp": 7, "bowl": 1, "amount": 1}));
    feeder.tick(&mut rig.io);
    rig.io.cloud.push_failure();
    feeder.tick(&mut rig.io);
    rig.io
        .cloud
        .push_command(json!({"command": "feed", "timestamp": 7, "bowl": 1, "amount": 1}));
    feeder.tick(&mut rig.io);
    assert_eq!(command_dispenses(&rig), vec![7]);
}

#[test]
fn schedules_keep_firing_across_a_stream_reconnect() {
    let mut rig = Rig::new();
    rig.io.cloud.schedules = vec![schedule_doc("breakfast", 1, 10, "08:02", &["M"])];
    rig.time.set_wall(Some(monday_at(8, 0)));
    let mut feeder = rig.operational();
    feeder.tick(&mut rig.io);

    rig.io.cloud.push_events(vec![StreamEvent::Timeout]);
    // 130 s of 100 ms ticks carries the wall clock past 08:02.
    for _ in 0..1_300 {
        rig.time.advance_ms(100);
        feeder.tick(&mut rig.io);
    }

    assert!(rig.io.sink.events.contains(&AppEvent::StreamLost));
    assert_eq!(feeder.commands().opened_count(), 2);
    assert_eq!(
        rig.io
            .sink
            .count(|e| matches!(e, AppEvent::ScheduleTriggered { .. })),
        1
    );
    assert_eq!(feeder.state(), StateId::Operational);
}

#[test]
fn stream_waits_for_a_valid_token() {
    let mut rig = Rig::new();
    let mut feeder = rig.operational();
    rig.io.cloud.ready = false;
    feeder.tick(&mut rig.io);
    assert!(rig.io.cloud.stream_paths.is_empty());

    rig.io.cloud.ready = true;
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.stream_paths.len(), 1);
}
