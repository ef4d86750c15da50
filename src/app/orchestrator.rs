//! Device orchestrator: the hexagonal core.
//!
//! [`Orchestrator`] owns the bring-up state machine, the schedule engine,
//! the command processor and the actuation controller.  All I/O flows
//! through port traits bundled in [`DeviceIo`], so the whole bring-up and
//! operational loop runs against mock adapters on the host.
//!
//! ```text
//!   StoragePort ─┐                                   ┌─▶ EventSink
//!  Connectivity ─┤    ┌──────────────────────────┐   │
//!   Auth/Docs/  ─┼──▶ │       Orchestrator        │ ──┘
//!   Realtime     │    │ FSM · Schedules · Stream  │ ──▶ ActuationController
//!   ClockPort ───┘    └──────────────────────────┘
//! ```
//!
//! One call to [`Orchestrator::tick`] is one iteration of the cooperative
//! loop.  A dispense blocks inside the tick for its full duration; nothing
//! else runs meanwhile.

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, error, info, warn};

use crate::actuation::ActuationController;
use crate::config::FeederConfig;
use crate::fsm::{BringUpEvent, Fsm, StateId};
use crate::identity::{self, Identity};
use crate::persist;
use crate::scheduler::{Schedule, ScheduleEngine};
use crate::stream::{CommandProcessor, Ingest};

use super::events::{AppEvent, FeedSource};
use super::ports::{
    AuthPort, ClockPort, CloudError, ConnectivityPort, DocumentStore, EventSink, RealtimePort,
    SchedulerDelegate, StoragePort,
};

// ───────────────────────────────────────────────────────────────
// I/O bundle
// ───────────────────────────────────────────────────────────────

/// Every adapter the orchestrator talks to.
///
/// `cloud` satisfies **all three** cloud ports: one client holds the session
/// token, and splitting it would mean sharing it behind a lock.
pub struct DeviceIo<S, W, C, K, B, E> {
    pub storage: S,
    pub wifi: W,
    pub cloud: C,
    pub clock: K,
    /// Used for the bounded link wait in CONNECTING.
    pub delay: B,
    pub sink: E,
}

/// What the caller's loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sleep one tick interval and call again.
    Continue,
    /// Credentials were saved; reboot so bring-up starts from CONNECTING.
    Restart,
    /// Terminal ERROR.  Idle until power-cycled.
    Halted,
}

// ───────────────────────────────────────────────────────────────
// Orchestrator
// ───────────────────────────────────────────────────────────────

pub struct Orchestrator<P, D> {
    fsm: Fsm,
    config: FeederConfig,
    schedules: ScheduleEngine,
    commands: CommandProcessor,
    actuation: ActuationController<P, D>,
    identity: Option<Identity>,
    /// Whether `AuthPort::begin` has succeeded this session.
    auth_begun: bool,
}

impl<P: SetDutyCycle, D: DelayNs> Orchestrator<P, D> {
    /// Pick the initial state from persisted credentials and park the servos.
    pub fn boot(
        config: FeederConfig,
        mut actuation: ActuationController<P, D>,
        storage: &impl StoragePort,
        sink: &mut impl EventSink,
    ) -> Self {
        let initial = if persist::has_wifi_credentials(storage) {
            StateId::Connecting
        } else {
            StateId::Provisioning
        };
        if let Err(e) = actuation.park_all() {
            warn!("Orchestrator: could not park servos at boot: {}", e);
        }

        info!("Orchestrator: booting into {:?}", initial);
        sink.emit(&AppEvent::Started(initial));

        Self {
            fsm: Fsm::new(initial),
            schedules: ScheduleEngine::new(&config),
            commands: CommandProcessor::new(),
            actuation,
            identity: None,
            auth_begun: false,
            config,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run the handler for the current state once.
    pub fn tick<S, W, C, K, B, E>(&mut self, io: &mut DeviceIo<S, W, C, K, B, E>) -> TickOutcome
    where
        S: StoragePort,
        W: ConnectivityPort,
        C: AuthPort + DocumentStore + RealtimePort,
        K: ClockPort,
        B: DelayNs,
        E: EventSink,
    {
        self.fsm.tick();

        let event = match self.fsm.current_state() {
            StateId::Provisioning => {
                if persist::has_wifi_credentials(&io.storage) {
                    info!("Orchestrator: credentials saved, restart requested");
                    return TickOutcome::Restart;
                }
                None
            }
            StateId::Connecting => Some(self.connect(io)),
            StateId::Authenticating => self.authenticate(io),
            StateId::Registering => self.register(io),
            StateId::Operational => {
                self.operate(io);
                None
            }
            StateId::Error => return TickOutcome::Halted,
        };

        if let Some(event) = event {
            self.apply(event, io);
        }

        if self.fsm.current_state() == StateId::Error {
            TickOutcome::Halted
        } else {
            TickOutcome::Continue
        }
    }

    fn apply<S, W, C, K, B, E>(&mut self, event: BringUpEvent, io: &mut DeviceIo<S, W, C, K, B, E>)
    where
        C: DocumentStore,
        K: ClockPort,
        E: EventSink,
    {
        let from = self.fsm.current_state();
        let Some(to) = self.fsm.dispatch(event) else {
            return;
        };
        io.sink.emit(&AppEvent::StateChanged { from, to });

        if to == StateId::Operational {
            self.enter_operational(io);
        }
    }

    /// Initial schedule fetch.  A failure here is transient: the periodic
    /// check retries it.
    fn enter_operational<S, W, C, K, B, E>(&mut self, io: &mut DeviceIo<S, W, C, K, B, E>)
    where
        C: DocumentStore,
        K: ClockPort,
        E: EventSink,
    {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        info!("Orchestrator: operational as {}", identity);
        let now = io.clock.uptime_ms();
        if let Ok(report) = self.schedules.fetch(&mut io.cloud, identity.as_str(), now) {
            io.sink.emit(&AppEvent::SchedulesLoaded(report));
        }
    }

    // ── CONNECTING ────────────────────────────────────────────

    /// Join the saved network within the attempt budget.  This is the one
    /// bounded block in bring-up.
    fn connect<S, W, C, K, B, E>(&mut self, io: &mut DeviceIo<S, W, C, K, B, E>) -> BringUpEvent
    where
        S: StoragePort,
        W: ConnectivityPort,
        B: DelayNs,
    {
        let creds = match persist::load_wifi_credentials(&io.storage) {
            Ok(Some(creds)) => creds,
            Ok(None) => {
                error!("Orchestrator: no saved SSID");
                return BringUpEvent::Misconfigured;
            }
            Err(e) => {
                error!("Orchestrator: saved credentials unreadable: {}", e);
                return BringUpEvent::Misconfigured;
            }
        };
        if let Err(e) = io.wifi.set_credentials(&creds.ssid, &creds.password) {
            error!("Orchestrator: saved credentials rejected: {}", e);
            return BringUpEvent::Misconfigured;
        }

        info!("Orchestrator: joining '{}'", creds.ssid);
        if let Err(e) = io.wifi.begin_connect() {
            error!("Orchestrator: connect could not start: {}", e);
            return BringUpEvent::LinkFailed;
        }

        let budget = self.config.wifi_connect_attempts;
        let mut attempts = 0u16;
        while !io.wifi.is_connected() {
            if attempts >= budget {
                error!("Orchestrator: no link after {} attempts", attempts);
                return BringUpEvent::LinkFailed;
            }
            io.delay.delay_ms(self.config.wifi_retry_delay_ms);
            attempts += 1;
            debug!("Orchestrator: waiting for link ({}/{})", attempts, budget);
        }

        info!("Orchestrator: link up (RSSI={:?})", io.wifi.rssi());
        BringUpEvent::LinkUp
    }

    // ── AUTHENTICATING ────────────────────────────────────────

    fn authenticate<S, W, C, K, B, E>(
        &mut self,
        io: &mut DeviceIo<S, W, C, K, B, E>,
    ) -> Option<BringUpEvent>
    where
        S: StoragePort,
        C: AuthPort,
    {
        if !self.auth_begun {
            match io.cloud.begin() {
                Ok(()) => self.auth_begun = true,
                Err(e) => {
                    warn!("Orchestrator: auth start failed ({}), retrying next tick", e);
                    return None;
                }
            }
        }
        if !io.cloud.is_ready() {
            return None;
        }

        match persist::load_identity(&io.storage) {
            Ok(cached) => {
                let identity_cached = cached.is_some();
                if let Some(identity) = cached {
                    info!("Orchestrator: using saved identity {}", identity);
                    self.identity = Some(identity);
                }
                Some(BringUpEvent::TokenReady { identity_cached })
            }
            Err(e) => {
                error!("Orchestrator: saved identity unreadable: {}", e);
                Some(BringUpEvent::Misconfigured)
            }
        }
    }

    // ── REGISTERING ───────────────────────────────────────────

    fn register<S, W, C, K, B, E>(
        &mut self,
        io: &mut DeviceIo<S, W, C, K, B, E>,
    ) -> Option<BringUpEvent>
    where
        S: StoragePort,
        C: AuthPort + DocumentStore,
        E: EventSink,
    {
        if !io.cloud.is_ready() {
            return None;
        }

        let owner = match identity::provisioned_owner(&io.storage) {
            Ok(owner) => owner,
            Err(e) => {
                error!("Orchestrator: cannot register: {}", e);
                return Some(BringUpEvent::Misconfigured);
            }
        };

        match identity::register(&mut io.cloud, &mut io.storage, &owner) {
            Ok(identity) => {
                io.sink.emit(&AppEvent::Registered {
                    identity: identity.as_str().into(),
                });
                self.identity = Some(identity);
                Some(BringUpEvent::Registered)
            }
            Err(e) if e.class().is_fatal_during_bring_up() => {
                error!("Orchestrator: registration misconfigured: {}", e);
                Some(BringUpEvent::Misconfigured)
            }
            Err(e) => {
                error!("Orchestrator: registration failed: {}", e);
                Some(BringUpEvent::RegistrationFailed)
            }
        }
    }

    // ── OPERATIONAL ───────────────────────────────────────────

    fn operate<S, W, C, K, B, E>(&mut self, io: &mut DeviceIo<S, W, C, K, B, E>)
    where
        W: ConnectivityPort,
        C: AuthPort + DocumentStore + RealtimePort,
        K: ClockPort,
        E: EventSink,
    {
        let Some(identity) = self.identity.as_ref() else {
            error!("Orchestrator: operational without identity");
            return;
        };

        // 1. Keep the station link alive.
        io.wifi.poll();

        // 2. (Re)open the command channel.
        if io.cloud.is_ready() {
            let path = identity.command_path();
            match self
                .commands
                .ensure_channel(&mut io.cloud, &path, io.clock.uptime_ms())
            {
                Ok(true) => io.sink.emit(&AppEvent::StreamConnected {
                    reconnect: self.commands.opened_count() > 1,
                }),
                Ok(false) => {}
                Err(e) => warn!("Orchestrator: could not open {}: {}", path, e),
            }
        }

        // 3. Scheduled feeds.  Dispenses block here.
        let mut delegate = FireDelegate {
            actuation: &mut self.actuation,
            sink: &mut io.sink,
        };
        self.schedules
            .evaluate(io.clock.uptime_ms(), io.clock.local_time(), &mut delegate);

        // 4. Periodic fetch.
        if let Some(Ok(report)) =
            self.schedules
                .poll_fetch(&mut io.cloud, identity.as_str(), io.clock.uptime_ms())
        {
            io.sink.emit(&AppEvent::SchedulesLoaded(report));
        }

        // 5. Drain the stream once.
        let ingested = self.commands.service_stream(
            &mut io.cloud,
            &mut self.schedules,
            identity.as_str(),
            io.clock.uptime_ms(),
        );
        for ingest in ingested {
            report_ingest(&ingest, &mut io.sink);
        }

        // 6. At most one staged command.
        if let Some(drained) =
            self.commands
                .drain_pending(&mut self.actuation, &mut io.cloud, identity.as_str())
        {
            if let Ok(outcome) = drained.outcome {
                io.sink.emit(&AppEvent::Dispensed {
                    source: FeedSource::Command {
                        timestamp: drained.request.timestamp,
                    },
                    outcome,
                });
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    pub fn schedules(&self) -> &ScheduleEngine {
        &self.schedules
    }

    pub fn commands(&self) -> &CommandProcessor {
        &self.commands
    }

    pub fn actuation(&self) -> &ActuationController<P, D> {
        &self.actuation
    }
}

fn report_ingest(ingest: &Ingest, sink: &mut impl EventSink) {
    match ingest {
        Ingest::Staged(request) => sink.emit(&AppEvent::FeedAccepted {
            timestamp: request.timestamp,
            bowl: request.bowl,
            grams: request.grams,
        }),
        Ingest::Refetched(Ok(report)) => sink.emit(&AppEvent::SchedulesLoaded(*report)),
        Ingest::Refetched(Err(CloudError::NotReady)) => {
            debug!("Orchestrator: refetch skipped, token not ready");
        }
        Ingest::ChannelClosed => sink.emit(&AppEvent::StreamLost),
        Ingest::Refetched(Err(_)) | Ingest::Ignored(_) => {}
    }
}

// ───────────────────────────────────────────────────────────────
// Schedule → actuation bridge
// ───────────────────────────────────────────────────────────────

/// Forwards fired schedules to the actuation controller.
struct FireDelegate<'a, P, D, E> {
    actuation: &'a mut ActuationController<P, D>,
    sink: &'a mut E,
}

impl<P: SetDutyCycle, D: DelayNs, E: EventSink> SchedulerDelegate for FireDelegate<'_, P, D, E> {
    fn on_schedule_fired(&mut self, schedule: &Schedule) {
        self.sink.emit(&AppEvent::ScheduleTriggered {
            id: schedule.id.clone(),
            bowl: schedule.bowl,
            grams: schedule.portion_grams,
        });
        match self.actuation.dispense(schedule.bowl, schedule.portion_grams) {
            Ok(outcome) => self.sink.emit(&AppEvent::Dispensed {
                source: FeedSource::Schedule,
                outcome,
            }),
            Err(e) => warn!("Orchestrator: schedule '{}' dispense failed: {}", schedule.id, e),
        }
    }
}
