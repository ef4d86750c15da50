//! System clock adapter.
//!
//! Implements [`ClockPort`]:
//!
//! - **uptime**: `esp_timer_get_time()` on the ESP32 (microsecond,
//!   monotonic), `std::time::Instant` on the host.
//! - **local time**: the system wall clock (set by SNTP on the device)
//!   shifted by the configured fixed UTC offset.  Anything before
//!   2020-01-01 means SNTP has not synced yet and reads as `None`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};

use crate::app::ports::ClockPort;

/// 2020-01-01T00:00:00Z.  Earlier readings are the unsynced RTC.
const EPOCH_2020: i64 = 1_577_836_800;

pub struct SystemClock {
    offset: FixedOffset,
    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    start: std::time::Instant,
}

impl SystemClock {
    /// Out-of-range offsets fall back to UTC.
    pub fn new(utc_offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| {
            log::warn!("Clock: UTC offset {}s out of range, using UTC", utc_offset_secs);
            Utc.fix()
        });
        Self {
            offset,
            #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
            start: std::time::Instant::now(),
        }
    }
}

/// Local wall-clock time for a Unix timestamp, or `None` if unsynced.
pub fn local_from_unix(unix_secs: i64, offset: FixedOffset) -> Option<NaiveDateTime> {
    if unix_secs < EPOCH_2020 {
        return None;
    }
    DateTime::from_timestamp(unix_secs, 0).map(|utc| utc.with_timezone(&offset).naive_local())
}

impl ClockPort for SystemClock {
    #[cfg(all(target_os = "espidf", feature = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        // SAFETY: reads the free-running high-resolution timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(all(target_os = "espidf", feature = "espidf")))]
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        local_from_unix(Utc::now().timestamp(), self.offset)
    }
}
