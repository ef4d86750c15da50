//! System configuration parameters
//!
//! All tunable parameters for the PawFeeds feeder.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

/// Core feeder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederConfig {
    // --- Dispensing ---
    /// Open-loop calibration: how long a servo stays open per gram.
    pub dispense_ms_per_gram: u32,
    /// Number of physical bowls (servos), numbered from 1.
    pub bowl_count: u8,

    // --- Connectivity ---
    /// Link polls before CONNECTING gives up and enters ERROR.
    pub wifi_connect_attempts: u16,
    /// Fixed delay between link polls (milliseconds).
    pub wifi_retry_delay_ms: u32,

    // --- Schedules ---
    /// Minimum wall-clock progress between schedule evaluations (seconds).
    pub schedule_check_interval_secs: u32,
    /// Periodic refetch of the schedule collection (seconds).
    pub schedule_fetch_interval_secs: u32,
    /// Retry delay after a failed periodic fetch (seconds).
    pub schedule_fetch_retry_secs: u32,
    /// Documents requested per list call.
    pub schedule_page_size: u16,
    /// Local timezone as a fixed offset from UTC (seconds, east positive).
    pub utc_offset_secs: i32,

    // --- Timing ---
    /// Idle delay between control ticks (milliseconds).
    pub tick_interval_ms: u32,
    /// Idle period between "halted" reminders while in ERROR (milliseconds).
    pub error_idle_ms: u32,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            // Dispensing
            dispense_ms_per_gram: 50,
            bowl_count: 2,

            // Connectivity
            wifi_connect_attempts: 30,
            wifi_retry_delay_ms: 500, // 15 s worst case

            // Schedules
            schedule_check_interval_secs: 60,
            schedule_fetch_interval_secs: 3600, // hourly
            schedule_fetch_retry_secs: 60,
            schedule_page_size: 100,
            utc_offset_secs: 8 * 3600, // GMT+8, no daylight saving

            // Timing
            tick_interval_ms: 100, // 10 Hz
            error_idle_ms: 10_000,
        }
    }
}

impl FeederConfig {
    pub fn schedule_check_interval_ms(&self) -> u64 {
        u64::from(self.schedule_check_interval_secs) * 1000
    }

    pub fn schedule_fetch_interval_ms(&self) -> u64 {
        u64::from(self.schedule_fetch_interval_secs) * 1000
    }

    pub fn schedule_fetch_retry_ms(&self) -> u64 {
        u64::from(self.schedule_fetch_retry_secs) * 1000
    }
}

// ---------------------------------------------------------------------------
// Cloud backend coordinates
// ---------------------------------------------------------------------------

const DEFAULT_PROJECT_ID: &str = "pawfeeds-v2";
const DEFAULT_DATABASE_URL: &str = "https://pawfeeds-v2-default-rtdb.firebaseio.com";

/// Where the feeder's backend lives.  Baked in at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    /// Firestore project that holds `feeders/` and `users/`.
    pub project_id: String,
    /// Realtime Database root URL (no trailing slash).
    pub database_url: String,
    /// Web API key used for the device's anonymous sign-in.
    pub api_key: String,
}

impl CloudSettings {
    /// Resolve from `PAWFEED_*` build-time environment variables.
    pub fn from_build_env() -> Self {
        Self {
            project_id: option_env!("PAWFEED_PROJECT_ID")
                .unwrap_or(DEFAULT_PROJECT_ID)
                .to_owned(),
            database_url: option_env!("PAWFEED_DATABASE_URL")
                .unwrap_or(DEFAULT_DATABASE_URL)
                .trim_end_matches('/')
                .to_owned(),
            api_key: option_env!("PAWFEED_API_KEY").unwrap_or("").to_owned(),
        }
    }

    /// Base URL for Firestore REST document paths.
    pub fn documents_url(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }
}
