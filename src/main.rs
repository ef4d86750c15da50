//! PawFeeds firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                    │
//! │                                                              │
//! │  NvsAdapter      WifiAdapter        FirebaseClient           │
//! │  (Config+NVS)    (Connectivity)     (Auth+Docs+Realtime)     │
//! │  SystemClock     LogEventSink       http_server (setup AP)   │
//! │                                                              │
//! │  ─────────────────── Port trait boundary ─────────────────   │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Orchestrator: bring-up FSM · schedules · commands      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  ActuationController ──▶ ServoDriver ──▶ LEDC (50 Hz)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Without stored Wi-Fi credentials the feeder raises an open access point
//! and serves the setup page until the owner submits the form; the HTTP
//! handler reboots the chip once the credentials are saved.  Otherwise the
//! orchestrator is ticked forever on the main task.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::ledc::config::TimerConfig;
use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver, Resolution};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info, warn};

use pawfeed::actuation::ActuationController;
use pawfeed::adapters::firebase::FirebaseClient;
use pawfeed::adapters::http_server::{self, ProvisioningSession};
use pawfeed::adapters::log_sink::LogEventSink;
use pawfeed::adapters::nvs::NvsAdapter;
use pawfeed::adapters::time::SystemClock;
use pawfeed::adapters::wifi::WifiAdapter;
use pawfeed::app::orchestrator::{DeviceIo, Orchestrator, TickOutcome};
use pawfeed::app::ports::ConfigPort;
use pawfeed::config::{CloudSettings, FeederConfig};
use pawfeed::fsm::StateId;
use pawfeed::pins;
use pawfeed::provisioning::ProvisioningListener;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("PawFeeds feeder v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;

    // ── 2. Config + storage ───────────────────────────────────
    let storage = NvsAdapter::new(partition.clone())?;
    let config = match storage.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            FeederConfig::default()
        }
    };

    // ── 3. Servos on LEDC ─────────────────────────────────────
    let timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::new()
            .frequency(Hertz(pins::SERVO_PWM_FREQ_HZ))
            .resolution(Resolution::Bits14),
    )?;
    let bowl1 = LedcDriver::new(peripherals.ledc.channel0, &timer, peripherals.pins.gpio21)?;
    let bowl2 = LedcDriver::new(peripherals.ledc.channel1, &timer, peripherals.pins.gpio22)?;
    let channels = [bowl1, bowl2]
        .into_iter()
        .take(usize::from(config.bowl_count));
    let actuation = ActuationController::new(channels, FreeRtos, config.dispense_ms_per_gram);

    // ── 4. Bring-up decision ──────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut orchestrator = Orchestrator::boot(config.clone(), actuation, &storage, &mut sink);

    let driver = EspWifi::new(peripherals.modem, sysloop, Some(partition.clone()))?;
    let mut wifi = WifiAdapter::new(driver);

    if orchestrator.state() == StateId::Provisioning {
        wifi.start_access_point(pins::PROVISIONING_AP_SSID)?;
        let session = Arc::new(Mutex::new(ProvisioningSession {
            listener: ProvisioningListener::new(),
            wifi,
            storage,
        }));
        let _server = http_server::start(session)?;
        info!(
            "Provisioning: join '{}' and open http://192.168.71.1/",
            pins::PROVISIONING_AP_SSID
        );
        // The `/save` handler reboots the chip.
        loop {
            FreeRtos::delay_ms(config.tick_interval_ms);
        }
    }

    // ── 5. Operational loop ───────────────────────────────────
    let _sntp = EspSntp::new_default()?;
    let mut io = DeviceIo {
        storage,
        wifi,
        cloud: FirebaseClient::new(CloudSettings::from_build_env()),
        clock: SystemClock::new(config.utc_offset_secs),
        delay: FreeRtos,
        sink,
    };

    loop {
        match orchestrator.tick(&mut io) {
            TickOutcome::Continue => FreeRtos::delay_ms(config.tick_interval_ms),
            TickOutcome::Restart => {
                info!("Restarting");
                // SAFETY: never returns; the chip resets.
                unsafe { esp_idf_svc::sys::esp_restart() };
            }
            TickOutcome::Halted => {
                error!("Halted in ERROR; power-cycle to retry");
                FreeRtos::delay_ms(config.error_idle_ms);
            }
        }
    }
}
