//! Provisioning flow: setup page → `/save` → restart → CONNECTING.

use pawfeed::adapters::wifi::WifiAdapter;
use pawfeed::app::orchestrator::TickOutcome;
use pawfeed::fsm::StateId;
use pawfeed::persist;
use pawfeed::provisioning::{Method, ProvisioningListener};

use crate::mock_hw::Rig;

#[test]
fn unprovisioned_feeder_waits_in_provisioning() {
    let mut rig = Rig::new();
    let mut feeder = rig.boot();
    assert_eq!(feeder.state(), StateId::Provisioning);
    for _ in 0..5 {
        assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Continue);
    }
    assert!(rig.io.cloud.stream_paths.is_empty());
    assert_eq!(rig.io.cloud.begin_calls, 0);
}

#[test]
fn saved_form_restarts_into_connecting() {
    let mut rig = Rig::new();
    let mut feeder = rig.boot();
    let mut listener = ProvisioningListener::new();
    let mut radio = WifiAdapter::new();

    let page = listener.handle(Method::Get, "/", b"", &mut radio, &mut rig.io.storage);
    assert_eq!(page.status, 200);
    assert!(page.body.contains("action=\"/save\""));

    let saved = listener.handle(
        Method::Post,
        "/save",
        b"ssid=Cafe+Wifi&pass=p%40ssw0rd!&uid=owner-42",
        &mut radio,
        &mut rig.io.storage,
    );
    assert_eq!(saved.status, 200);
    assert!(saved.restart);
    assert!(listener.saved());

    assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Restart);

    // After the reboot bring-up starts from CONNECTING with the decoded values.
    let mut rebooted = rig.boot();
    assert_eq!(rebooted.state(), StateId::Connecting);
    rebooted.tick(&mut rig.io);
    assert_eq!(
        rig.io.wifi.joined,
        Some(("Cafe Wifi".to_owned(), "p@ssw0rd!".to_owned()))
    );
    assert_eq!(
        persist::load_owner_id(&rig.io.storage).unwrap().as_deref(),
        Some("owner-42")
    );
}

#[test]
fn rejected_form_keeps_waiting() {
    let mut rig = Rig::new();
    let mut feeder = rig.boot();
    let mut listener = ProvisioningListener::new();
    let mut radio = WifiAdapter::new();

    let resp = listener.handle(
        Method::Post,
        "/save",
        b"ssid=Cafe&pass=short&uid=owner-42",
        &mut radio,
        &mut rig.io.storage,
    );
    assert_eq!(resp.status, 400);
    assert!(!listener.saved());
    assert_eq!(feeder.tick(&mut rig.io), TickOutcome::Continue);
    assert_eq!(rig.boot().state(), StateId::Provisioning);
}

#[test]
fn factory_reset_returns_to_provisioning() {
    let mut rig = Rig::new();
    rig.provision();
    assert_eq!(rig.boot().state(), StateId::Connecting);

    persist::factory_reset(&mut rig.io.storage).unwrap();
    assert_eq!(rig.boot().state(), StateId::Provisioning);
    assert_eq!(persist::load_identity(&rig.io.storage).unwrap(), None);
}

#[test]
fn network_list_is_deduplicated_and_sorted() {
    let mut rig = Rig::new();
    let mut radio = WifiAdapter::new();
    let resp = ProvisioningListener::new().handle(
        Method::Get,
        "/networks",
        b"",
        &mut radio,
        &mut rig.io.storage,
    );
    let list: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
    let list = list.as_array().unwrap();
    assert!(!list.is_empty());
    let strengths: Vec<i64> = list
        .iter()
        .map(|ap| ap["signal_strength"].as_i64().unwrap())
        .collect();
    assert!(strengths.windows(2).all(|w| w[0] >= w[1]));
}
