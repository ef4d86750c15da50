//! Bring-up scenarios: CONNECTING → AUTHENTICATING → REGISTERING →
//! OPERATIONAL against a scripted backend.

use pawfeed::app::events::AppEvent;
use pawfeed::app::orchestrator::TickOutcome;
use pawfeed::app::ports::CloudError;
use pawfeed::fsm::StateId;
use pawfeed::persist;

use crate::mock_hw::Rig;

#[test]
fn first_boot_registers_and_links_owner() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.assign_identity = Some("NEWFEEDER".into());

    let mut feeder = rig.boot();
    assert_eq!(feeder.state(), StateId::Connecting);

    feeder.tick(&mut rig.io);
    assert_eq!(feeder.state(), StateId::Authenticating);
    assert_eq!(
        rig.io.wifi.joined,
        Some(("HomeNet".to_owned(), "hunter22".to_owned()))
    );

    feeder.tick(&mut rig.io);
    assert_eq!(feeder.state(), StateId::Registering);
    assert_eq!(rig.io.cloud.begin_calls, 1);

    feeder.tick(&mut rig.io);
    assert_eq!(feeder.state(), StateId::Operational);

    // Identity document carries the owner.
    let (collection, body) = &rig.io.cloud.creates[0];
    assert_eq!(collection, "feeders");
    assert_eq!(body["fields"]["owner_uid"]["stringValue"], "owner-1");

    // Owner document points back at the feeder.
    let patch = &rig.io.cloud.patches[0];
    assert_eq!(patch.path, "users/owner-1");
    assert_eq!(patch.mask, "feederId");
    assert_eq!(patch.body["fields"]["feederId"]["stringValue"], "NEWFEEDER");

    let stored = persist::load_identity(&rig.io.storage).unwrap().unwrap();
    assert_eq!(stored.as_str(), "NEWFEEDER");
    assert_eq!(feeder.identity().map(|i| i.as_str()), Some("NEWFEEDER"));
    assert!(rig.io.sink.events.contains(&AppEvent::Registered {
        identity: "NEWFEEDER".into()
    }));

    // Initial schedule fetch ran on entry.
    assert_eq!(rig.io.cloud.list_calls, 1);

    // First operational tick subscribes to the command node.
    feeder.tick(&mut rig.io);
    assert_eq!(rig.io.cloud.stream_paths, vec!["/commands/NEWFEEDER".to_owned()]);
}

#[test]
fn second_boot_skips_registration() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.assign_identity = Some("NEWFEEDER".into());
    let mut first = rig.boot();
    for _ in 0..3 {
        first.tick(&mut rig.io);
    }
    assert_eq!(first.state(), StateId::Operational);
    let creates = rig.io.cloud.creates.len();

    // Reboot with the same flash.
    let mut second = rig.boot();
    second.tick(&mut rig.io);
    second.tick(&mut rig.io);
    assert_eq!(second.state(), StateId::Operational);
    assert_eq!(rig.io.cloud.creates.len(), creates);
    assert_eq!(second.identity().map(|i| i.as_str()), Some("NEWFEEDER"));
}

#[test]
fn every_transition_is_reported_in_order() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.assign_identity = Some("F9".into());
    let mut feeder = rig.boot();
    for _ in 0..3 {
        feeder.tick(&mut rig.io);
    }

    let path: Vec<(StateId, StateId)> = rig
        .io
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        path,
        vec![
            (StateId::Connecting, StateId::Authenticating),
            (StateId::Authenticating, StateId::Registering),
            (StateId::Registering, StateId::Operational),
        ]
    );
    assert_eq!(rig.io.sink.events[0], AppEvent::Started(StateId::Connecting));
}

#[test]
fn unreachable_network_halts_after_budget() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.wifi.reachable = false;
    let mut feeder = rig.boot();

    assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Halted);
    assert_eq!(feeder.state(), StateId::Error);
    // 30 attempts × 500 ms of blocking waits.
    assert_eq!(rig.time.uptime_ms(), 15_000);
    assert!(rig.io.cloud.creates.is_empty());
}

#[test]
fn backend_refusing_create_halts_without_identity() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.assign_identity = None;
    let mut feeder = rig.boot();
    feeder.tick(&mut rig.io);
    feeder.tick(&mut rig.io);

    assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Halted);
    assert!(rig.io.cloud.patches.is_empty());
    assert_eq!(persist::load_identity(&rig.io.storage).unwrap(), None);
}

#[test]
fn owner_link_failure_discards_the_new_identity() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.assign_identity = Some("ORPHAN".into());
    rig.io.cloud.patch_error = Some(CloudError::Http(403));
    let mut feeder = rig.boot();
    feeder.tick(&mut rig.io);
    feeder.tick(&mut rig.io);

    assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Halted);
    assert_eq!(rig.io.cloud.creates.len(), 1);
    assert_eq!(persist::load_identity(&rig.io.storage).unwrap(), None);
    assert!(feeder.identity().is_none());
}

#[test]
fn token_delay_holds_authenticating() {
    let mut rig = Rig::new();
    rig.provision();
    rig.io.cloud.ready = false;
    let mut feeder = rig.boot();
    feeder.tick(&mut rig.io);
    for _ in 0..10 {
        assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Continue);
    }
    assert_eq!(feeder.state(), StateId::Authenticating);
    // Sign-in is started once, not per tick.
    assert_eq!(rig.io.cloud.begin_calls, 1);
}
