//! Mock adapters for integration tests.
//!
//! Every mock records what it was asked to do so scenarios can assert on the
//! full call history.  Time is shared: [`SimTime`] is cloned into the clock
//! and into every delay, so blocking waits (link polling, dispensing) move
//! the uptime and wall clock forward exactly as they would on the device.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::{ErrorType, SetDutyCycle};
use serde_json::{Value, json};

use pawfeed::actuation::ActuationController;
use pawfeed::adapters::nvs::NvsAdapter;
use pawfeed::app::events::AppEvent;
use pawfeed::app::orchestrator::{DeviceIo, Orchestrator};
use pawfeed::app::ports::{
    AccessPoint, AuthPort, ClockPort, CloudError, ConnectivityError, ConnectivityPort,
    DocumentStore, EventSink, RealtimePort,
};
use pawfeed::cloud::rtdb::StreamEvent;
use pawfeed::config::FeederConfig;
use pawfeed::persist::{self, ProvisioningRecord, WifiCredentials};

// ── Shared time ───────────────────────────────────────────────

#[derive(Clone)]
pub struct SimTime {
    uptime_ms: Rc<Cell<u64>>,
    wall: Rc<Cell<Option<NaiveDateTime>>>,
}

#[allow(dead_code)]
impl SimTime {
    pub fn new() -> Self {
        Self {
            uptime_ms: Rc::new(Cell::new(0)),
            wall: Rc::new(Cell::new(None)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.set(self.uptime_ms.get() + ms);
        if let Some(wall) = self.wall.get() {
            self.wall.set(Some(wall + TimeDelta::milliseconds(ms as i64)));
        }
    }

    pub fn set_wall(&self, wall: Option<NaiveDateTime>) {
        self.wall.set(wall);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }
}

/// 2024-01-01 is a Monday.
pub fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid date")
}

pub struct MockClock(pub SimTime);

impl ClockPort for MockClock {
    fn uptime_ms(&self) -> u64 {
        self.0.uptime_ms.get()
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        self.0.wall.get()
    }
}

pub struct MockDelay(pub SimTime);

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance_ms(u64::from(ns) / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.advance_ms(u64::from(ms));
    }
}

// ── Servo PWM ─────────────────────────────────────────────────

/// Records every duty write on one channel.
#[derive(Clone, Default)]
pub struct MockPwm {
    pub writes: Rc<RefCell<Vec<u16>>>,
}

impl ErrorType for MockPwm {
    type Error = Infallible;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        16_383
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
        self.writes.borrow_mut().push(duty);
        Ok(())
    }
}

// ── Wi-Fi ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockWifi {
    pub reachable: bool,
    pub joined: Option<(String, String)>,
    pub polls: u32,
}

impl MockWifi {
    pub fn up() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }
}

impl ConnectivityPort for MockWifi {
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        self.joined = Some((ssid.to_owned(), password.to_owned()));
        Ok(())
    }

    fn begin_connect(&mut self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.reachable
    }

    fn disconnect(&mut self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    fn poll(&mut self) {
        self.polls += 1;
    }

    fn rssi(&self) -> Option<i8> {
        self.reachable.then_some(-55)
    }

    fn scan(&mut self) -> Result<Vec<AccessPoint>, ConnectivityError> {
        Ok(Vec::new())
    }
}

// ── Cloud ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub path: String,
    pub body: Value,
    pub mask: String,
}

/// Scripted backend.  Stream reads pop one batch per call.
#[derive(Default)]
pub struct MockCloud {
    pub ready: bool,
    pub begin_calls: u32,
    /// Identity handed out by `create_document`; `None` fails the call.
    pub assign_identity: Option<String>,
    pub creates: Vec<(String, Value)>,
    pub patches: Vec<Patch>,
    pub patch_error: Option<CloudError>,
    /// Schedule documents served by `list_documents` (single page).
    pub schedules: Vec<Value>,
    pub list_calls: u32,
    pub list_error: Option<CloudError>,
    pub stream_paths: Vec<String>,
    pub inbox: VecDeque<Result<Vec<StreamEvent>, CloudError>>,
    pub deleted: Vec<String>,
    pub nulled: Vec<String>,
}

#[allow(dead_code)]
impl MockCloud {
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Queue a root `put` carrying `doc`.
    pub fn push_command(&mut self, doc: Value) {
        self.inbox.push_back(Ok(vec![StreamEvent::Put {
            path: "/".into(),
            data: doc,
        }]));
    }

    pub fn push_events(&mut self, events: Vec<StreamEvent>) {
        self.inbox.push_back(Ok(events));
    }

    pub fn push_failure(&mut self) {
        self.inbox.push_back(Err(CloudError::Transport));
    }
}

impl AuthPort for MockCloud {
    fn begin(&mut self) -> Result<(), CloudError> {
        self.begin_calls += 1;
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.ready
    }
}

impl DocumentStore for MockCloud {
    fn create_document(&mut self, collection: &str, body: &str) -> Result<String, CloudError> {
        let body: Value = serde_json::from_str(body).map_err(|_| CloudError::InvalidResponse)?;
        self.creates.push((collection.to_owned(), body));
        match &self.assign_identity {
            Some(id) => Ok(json!({
                "name": format!("projects/p/databases/(default)/documents/{collection}/{id}")
            })
            .to_string()),
            None => Err(CloudError::Http(503)),
        }
    }

    fn patch_document(&mut self, path: &str, body: &str, mask: &str) -> Result<(), CloudError> {
        if let Some(e) = self.patch_error {
            return Err(e);
        }
        self.patches.push(Patch {
            path: path.to_owned(),
            body: serde_json::from_str(body).map_err(|_| CloudError::InvalidResponse)?,
            mask: mask.to_owned(),
        });
        Ok(())
    }

    fn list_documents(&mut self, _: &str, _: u16, _: Option<&str>) -> Result<String, CloudError> {
        self.list_calls += 1;
        if let Some(e) = self.list_error {
            return Err(e);
        }
        Ok(json!({ "documents": self.schedules }).to_string())
    }
}

impl RealtimePort for MockCloud {
    fn begin_stream(&mut self, path: &str) -> Result<(), CloudError> {
        self.stream_paths.push(path.to_owned());
        Ok(())
    }

    fn read_stream(&mut self) -> Result<Vec<StreamEvent>, CloudError> {
        self.inbox.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn delete_node(&mut self, path: &str) -> Result<(), CloudError> {
        self.deleted.push(path.to_owned());
        Ok(())
    }

    fn set_null(&mut self, path: &str) -> Result<(), CloudError> {
        self.nulled.push(path.to_owned());
        Ok(())
    }
}

/// Firestore REST shape of one schedule document.
pub fn schedule_doc(id: &str, bowl: i64, grams: i64, time: &str, days: &[&str]) -> Value {
    let days: Vec<Value> = days.iter().map(|d| json!({ "stringValue": d })).collect();
    json!({
        "name": format!("projects/p/databases/(default)/documents/feeders/F/schedules/{id}"),
        "fields": {
            "isEnabled": { "booleanValue": true },
            "bowlNumber": { "integerValue": bowl.to_string() },
            "portionGrams": { "integerValue": grams.to_string() },
            "time": { "stringValue": time },
            "repeatDays": { "arrayValue": { "values": days } },
        }
    })
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type Io = DeviceIo<NvsAdapter, MockWifi, MockCloud, MockClock, MockDelay, RecordingSink>;
pub type Feeder = Orchestrator<MockPwm, MockDelay>;

/// A feeder with two bowls, one mock channel each.
pub struct Rig {
    pub time: SimTime,
    pub bowls: [MockPwm; 2],
    pub io: Io,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        let time = SimTime::new();
        Self {
            bowls: [MockPwm::default(), MockPwm::default()],
            io: DeviceIo {
                storage: NvsAdapter::new().expect("sim NVS"),
                wifi: MockWifi::up(),
                cloud: MockCloud::ready(),
                clock: MockClock(time.clone()),
                delay: MockDelay(time.clone()),
                sink: RecordingSink::default(),
            },
            time,
        }
    }

    pub fn provision(&mut self) {
        persist::save_provisioning(
            &mut self.io.storage,
            &ProvisioningRecord {
                wifi: WifiCredentials {
                    ssid: "HomeNet".try_into().expect("ssid"),
                    password: "hunter22".try_into().expect("password"),
                },
                owner_id: "owner-1".try_into().expect("owner"),
            },
        )
        .expect("save provisioning");
    }

    pub fn boot(&mut self) -> Feeder {
        let config = FeederConfig::default();
        let actuation = ActuationController::new(
            self.bowls.clone(),
            MockDelay(self.time.clone()),
            config.dispense_ms_per_gram,
        );
        Orchestrator::boot(config, actuation, &self.io.storage, &mut self.io.sink)
    }

    /// Boot a provisioned feeder that already has identity `F1` and tick it
    /// into OPERATIONAL.
    pub fn operational(&mut self) -> Feeder {
        self.provision();
        persist::save_identity(
            &mut self.io.storage,
            &pawfeed::identity::Identity::parse("F1").expect("identity"),
        )
        .expect("save identity");
        let mut feeder = self.boot();
        feeder.tick(&mut self.io);
        feeder.tick(&mut self.io);
        assert_eq!(feeder.state(), pawfeed::fsm::StateId::Operational);
        feeder
    }
}
