//! Wi-Fi adapter.
//!
//! Implements [`ConnectivityPort`], the hexagonal boundary for network
//! connectivity.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"` + `espidf` feature**: real ESP-IDF Wi-Fi
//!   driver via `esp_idf_svc::wifi`.
//! - **all other targets**: simulation backend for host-side tests.
//!
//! ## Reconnection policy
//!
//! The first join is driven by the orchestrator (bounded attempt budget).
//! Once operational, [`ConnectivityPort::poll`] notices a dropped link and
//! retries with exponential backoff (2 s → 4 s → 8 s … capped at 60 s).

use std::time::{Duration, Instant};

use log::{info, warn};

use super::utils::is_printable_ascii;
use crate::app::ports::{AccessPoint, ConnectivityError, ConnectivityPort};

#[cfg(all(target_os = "espidf", feature = "espidf"))]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Next backoff after a failed reconnect.
pub fn next_backoff(current_secs: u64) -> u64 {
    current_secs.saturating_mul(2).min(MAX_BACKOFF_SECS)
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// 1–32 bytes of printable ASCII.
pub fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

/// Empty (open network) or 8–64 bytes (WPA2).
pub fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

/// Strongest reading per SSID, strongest first.  Hidden networks dropped.
pub fn dedup_by_ssid(mut found: Vec<AccessPoint>) -> Vec<AccessPoint> {
    found.retain(|ap| !ap.ssid.is_empty());
    found.sort_by(|a, b| {
        b.signal_strength
            .cmp(&a.signal_strength)
            .then_with(|| a.ssid.cmp(&b.ssid))
    });
    let mut out: Vec<AccessPoint> = Vec::with_capacity(found.len());
    for ap in found {
        if !out.iter().any(|seen| seen.ssid == ap.ssid) {
            out.push(ap);
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Wi-Fi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u64,
    next_retry: Option<Instant>,
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    driver: EspWifi<'static>,
    /// Simulation: whether the simulated AP is reachable.
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    sim_reachable: bool,
}

impl WifiAdapter {
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    pub fn new(driver: EspWifi<'static>) -> Self {
        Self {
            state: WifiState::Idle,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            next_retry: None,
            driver,
        }
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Idle,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            next_retry: None,
            sim_reachable: true,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Simulation: make the access point (un)reachable.
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    pub fn set_reachable(&mut self, reachable: bool) {
        self.sim_reachable = reachable;
    }

    /// Bring up the open setup access point next to the station interface
    /// so `scan` keeps working while the provisioning page is served.
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    pub fn start_access_point(&mut self, ssid: &str) -> anyhow::Result<()> {
        let ap = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|()| anyhow::anyhow!("AP SSID too long"))?,
            auth_method: AuthMethod::None,
            ..Default::default()
        };
        self.driver
            .set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap))?;
        self.driver.start()?;
        info!("WiFi: setup AP '{}' up", ssid);
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        let client = ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method: if self.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        self.driver
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| ConnectivityError::DriverError)?;
        if !self.driver.is_started().unwrap_or(false) {
            self.driver.start().map_err(|_| ConnectivityError::DriverError)?;
        }
        self.driver.connect().map_err(|e| {
            warn!("WiFi: driver refused connect: {}", e);
            ConnectivityError::DriverError
        })
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        info!("WiFi(sim): associating with '{}'", self.ssid);
        Ok(())
    }

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn platform_disconnect(&mut self) -> Result<(), ConnectivityError> {
        self.driver
            .disconnect()
            .map_err(|_| ConnectivityError::DriverError)
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn platform_disconnect(&mut self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn platform_link_up(&self) -> bool {
        self.driver.is_up().unwrap_or(false)
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn platform_link_up(&self) -> bool {
        self.sim_reachable && self.state != WifiState::Idle
    }

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        // SAFETY: plain C struct filled in by the driver; zeroed is a valid
        // initial value.
        let mut info: esp_idf_svc::sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(info.rssi)
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn platform_rssi(&self) -> Option<i8> {
        self.platform_link_up().then_some(-58)
    }

    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn platform_scan(&mut self) -> Result<Vec<AccessPoint>, ConnectivityError> {
        let found = self.driver.scan().map_err(|e| {
            warn!("WiFi: scan failed: {}", e);
            ConnectivityError::DriverError
        })?;
        Ok(found
            .into_iter()
            .map(|ap| AccessPoint {
                ssid: ap.ssid.as_str().to_owned(),
                signal_strength: ap.signal_strength,
            })
            .collect())
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn platform_scan(&mut self) -> Result<Vec<AccessPoint>, ConnectivityError> {
        Ok(vec![
            AccessPoint {
                ssid: "SimHome".into(),
                signal_strength: -48,
            },
            AccessPoint {
                ssid: "SimNeighbour".into(),
                signal_strength: -77,
            },
        ])
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn begin_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;
        self.platform_connect()
    }

    fn is_connected(&self) -> bool {
        self.platform_link_up()
    }

    fn disconnect(&mut self) -> Result<(), ConnectivityError> {
        self.state = WifiState::Idle;
        self.next_retry = None;
        info!("WiFi: disconnected");
        self.platform_disconnect()
    }

    fn poll(&mut self) {
        match self.state {
            WifiState::Connecting if self.platform_link_up() => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                info!("WiFi: connected (RSSI={:?})", self.platform_rssi());
            }
            WifiState::Connected if !self.platform_link_up() => {
                warn!("WiFi: connection lost, entering reconnect");
                self.state = WifiState::Reconnecting { attempt: 0 };
                self.next_retry = Some(Instant::now() + Duration::from_secs(self.backoff_secs));
            }
            WifiState::Reconnecting { attempt } => {
                if self.platform_link_up() {
                    self.state = WifiState::Connected;
                    self.backoff_secs = INITIAL_BACKOFF_SECS;
                    self.next_retry = None;
                    info!("WiFi: reconnected after {} attempt(s)", attempt);
                    return;
                }
                if self.next_retry.is_some_and(|at| Instant::now() < at) {
                    return;
                }
                info!("WiFi: reconnect attempt {} (backoff {}s)", attempt + 1, self.backoff_secs);
                if let Err(e) = self.platform_connect() {
                    warn!("WiFi: reconnect failed: {}", e);
                }
                self.backoff_secs = next_backoff(self.backoff_secs);
                self.next_retry = Some(Instant::now() + Duration::from_secs(self.backoff_secs));
                self.state = WifiState::Reconnecting {
                    attempt: attempt + 1,
                };
            }
            _ => {}
        }
    }

    fn rssi(&self) -> Option<i8> {
        self.platform_rssi()
    }

    fn scan(&mut self) -> Result<Vec<AccessPoint>, ConnectivityError> {
        let found = self.platform_scan()?;
        info!("WiFi: scan found {} access point(s)", found.len());
        Ok(found)
    }
}

#[cfg(not(all(target_os = "espidf", feature = "espidf")))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ssid() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.set_credentials("", "password123"), Err(ConnectivityError::InvalidSsid));
    }

    #[test]
    fn rejects_non_printable_ssid() {
        assert_eq!(validate_ssid("bad\tssid"), Err(ConnectivityError::InvalidSsid));
        assert_eq!(validate_ssid(&"a".repeat(33)), Err(ConnectivityError::InvalidSsid));
    }

    #[test]
    fn rejects_short_password() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.set_credentials("MyNet", "short"), Err(ConnectivityError::InvalidPassword));
    }

    #[test]
    fn accepts_open_network() {
        let mut a = WifiAdapter::new();
        assert!(a.set_credentials("OpenCafe", "").is_ok());
    }

    #[test]
    fn connect_without_credentials_fails() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.begin_connect(), Err(ConnectivityError::NoCredentials));
    }

    #[test]
    fn connect_poll_disconnect() {
        let mut a = WifiAdapter::new();
        a.set_credentials("TestNet", "password1").unwrap();
        a.begin_connect().unwrap();
        assert!(a.is_connected());
        a.poll();
        assert_eq!(a.state(), WifiState::Connected);
        assert!(a.rssi().is_some());
        a.disconnect().unwrap();
        assert!(!a.is_connected());
        assert!(a.rssi().is_none());
    }

    #[test]
    fn dropped_link_enters_reconnect_and_recovers() {
        let mut a = WifiAdapter::new();
        a.set_credentials("TestNet", "password1").unwrap();
        a.begin_connect().unwrap();
        a.poll();

        a.set_reachable(false);
        a.poll();
        assert_eq!(a.state(), WifiState::Reconnecting { attempt: 0 });

        a.set_reachable(true);
        a.poll();
        assert_eq!(a.state(), WifiState::Connected);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff(2), 4);
        assert_eq!(next_backoff(32), 60);
        assert_eq!(next_backoff(60), 60);
    }

    #[test]
    fn dedup_keeps_strongest_reading() {
        let found = vec![
            AccessPoint { ssid: "A".into(), signal_strength: -80 },
            AccessPoint { ssid: "B".into(), signal_strength: -40 },
            AccessPoint { ssid: "A".into(), signal_strength: -50 },
            AccessPoint { ssid: String::new(), signal_strength: -30 },
        ];
        let out = dedup_by_ssid(found);
        assert_eq!(
            out,
            vec![
                AccessPoint { ssid: "B".into(), signal_strength: -40 },
                AccessPoint { ssid: "A".into(), signal_strength: -50 },
            ]
        );
    }
}
