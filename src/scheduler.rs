//! Schedule engine: remote feeding rules, cached locally, matched per minute.
//!
//! The engine notifies a [`SchedulerDelegate`] when a schedule fires; the
//! orchestrator implements the delegate to run the actuation controller.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DocumentStore                            │
//! │            feeders/{identity}/schedules (paged)              │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ fetch(): full replace
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   Arc<[Schedule]>  immutable snapshot, swapped whole         │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ evaluate(): ≤ once per 60 s
//!                            ▼
//!   hour:minute == now  &&  weekday ∈ repeat_days  &&  enabled
//!                            │
//!                            ▼
//!                   SchedulerDelegate::on_schedule_fired
//! ```
//!
//! Matching is exact-minute.  A minute skipped (for instance because a long
//! dispense blocked the loop across it) is not caught up.

use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use log::{info, warn};

use crate::app::ports::{CloudError, DocumentStore, SchedulerDelegate};
use crate::cloud::firestore::{Document, ListPage};
use crate::cloud::schedules_path;
use crate::config::FeederConfig;
use crate::error::ParseError;

/// Upper bound on list calls per fetch.
const MAX_PAGES: usize = 50;

// ═══════════════════════════════════════════════════════════════
//  Weekday set
// ═══════════════════════════════════════════════════════════════

/// Set of weekdays, one bit per day (bit 0 = Sunday).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: Self = Self(0);
    pub const EVERY_DAY: Self = Self(0b0111_1111);

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | 1 << day.num_days_from_sunday())
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & 1 << day.num_days_from_sunday() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Build from wire tokens.  Any unknown token rejects the whole set.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self, ParseError> {
        tokens.into_iter().try_fold(Self::EMPTY, |set, token| {
            parse_day_token(token)
                .map(|day| set.with(day))
                .ok_or(ParseError::InvalidField("repeatDays"))
        })
    }
}

/// Storage codes `U M T W R F S` (Sunday first), or a weekday name.
pub fn parse_day_token(token: &str) -> Option<Weekday> {
    match token.trim() {
        "U" => Some(Weekday::Sun),
        "M" => Some(Weekday::Mon),
        "T" => Some(Weekday::Tue),
        "W" => Some(Weekday::Wed),
        "R" => Some(Weekday::Thu),
        "F" => Some(Weekday::Fri),
        "S" => Some(Weekday::Sat),
        other => other.parse().ok(),
    }
}

/// Parse `"HH:MM"` (24 h).
pub fn parse_time_of_day(s: &str) -> Result<(u8, u8), ParseError> {
    let invalid = ParseError::InvalidField("time");
    let (h, m) = s.trim().split_once(':').ok_or(invalid.clone())?;
    let hour: u8 = h.parse().map_err(|_| invalid.clone())?;
    let minute: u8 = m.parse().map_err(|_| invalid.clone())?;
    if hour > 23 || minute > 59 {
        return Err(invalid);
    }
    Ok((hour, minute))
}

// ═══════════════════════════════════════════════════════════════
//  Schedule
// ═══════════════════════════════════════════════════════════════

/// One recurring feeding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Store-assigned document id.
    pub id: String,
    pub enabled: bool,
    pub bowl: u32,
    pub portion_grams: u32,
    pub hour: u8,
    pub minute: u8,
    pub repeat_days: DaySet,
}

impl Schedule {
    /// Decode a Firestore schedule document.
    pub fn from_document(doc: &Document) -> Result<Self, ParseError> {
        let id = doc.id()?.to_owned();
        let enabled = doc.bool_field("isEnabled")?.unwrap_or(false);
        let bowl = positive(
            doc.integer_field("bowlNumber")?
                .ok_or(ParseError::MissingField("bowlNumber"))?,
            "bowlNumber",
        )?;
        let portion_grams = positive(
            doc.integer_field("portionGrams")?
                .ok_or(ParseError::MissingField("portionGrams"))?,
            "portionGrams",
        )?;
        let (hour, minute) =
            parse_time_of_day(doc.string_field("time")?.ok_or(ParseError::MissingField("time"))?)?;
        let repeat_days = match doc.string_array_field("repeatDays")? {
            Some(tokens) => DaySet::from_tokens(tokens)?,
            None => DaySet::EMPTY,
        };

        Ok(Self {
            id,
            enabled,
            bowl,
            portion_grams,
            hour,
            minute,
            repeat_days,
        })
    }

    /// Whether this schedule fires in the minute containing `now`.
    pub fn is_due(&self, now: &NaiveDateTime) -> bool {
        self.enabled
            && now.hour() == u32::from(self.hour)
            && now.minute() == u32::from(self.minute)
            && self.repeat_days.contains(now.weekday())
    }
}

fn positive(value: i64, field: &'static str) -> Result<u32, ParseError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(ParseError::InvalidField(field))
}

// ═══════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════

/// Result of one successful [`ScheduleEngine::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub loaded: usize,
    pub skipped: usize,
    pub pages: usize,
}

pub struct ScheduleEngine {
    /// Current cache.  Replaced whole, never edited in place.
    snapshot: Arc<[Schedule]>,
    /// Uptime of the last evaluation that was not rate-limited.
    last_checked_ms: Option<u64>,
    /// Uptime at which the next periodic fetch is due (`None` = now).
    next_fetch_ms: Option<u64>,
    check_interval_ms: u64,
    fetch_interval_ms: u64,
    fetch_retry_ms: u64,
    page_size: u16,
}

impl ScheduleEngine {
    pub fn new(config: &FeederConfig) -> Self {
        Self {
            snapshot: Arc::from(Vec::new()),
            last_checked_ms: None,
            next_fetch_ms: None,
            check_interval_ms: config.schedule_check_interval_ms(),
            fetch_interval_ms: config.schedule_fetch_interval_ms(),
            fetch_retry_ms: config.schedule_fetch_retry_ms(),
            page_size: config.schedule_page_size,
        }
    }

    /// Cheap handle on the current cache.
    pub fn snapshot(&self) -> Arc<[Schedule]> {
        Arc::clone(&self.snapshot)
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Pull the whole collection and swap it in.
    ///
    /// Malformed entries are logged and skipped.  If any request fails the
    /// previous snapshot stays in place.  Resets the periodic fetch timer.
    pub fn fetch(
        &mut self,
        docs: &mut impl DocumentStore,
        identity: &str,
        now_ms: u64,
    ) -> Result<FetchReport, CloudError> {
        match self.fetch_all(docs, identity) {
            Ok((schedules, report)) => {
                self.snapshot = schedules.into();
                self.next_fetch_ms = Some(now_ms.saturating_add(self.fetch_interval_ms));
                info!(
                    "Scheduler: loaded {} schedule(s), skipped {} ({} page(s))",
                    report.loaded, report.skipped, report.pages
                );
                Ok(report)
            }
            Err(e) => {
                self.next_fetch_ms = Some(now_ms.saturating_add(self.fetch_retry_ms));
                warn!(
                    "Scheduler: fetch failed ({}), keeping {} cached schedule(s)",
                    e,
                    self.snapshot.len()
                );
                Err(e)
            }
        }
    }

    fn fetch_all(
        &self,
        docs: &mut impl DocumentStore,
        identity: &str,
    ) -> Result<(Vec<Schedule>, FetchReport), CloudError> {
        let path = schedules_path(identity);
        let mut schedules = Vec::new();
        let mut skipped = 0;
        let mut token: Option<String> = None;
        let mut pages = 0;

        loop {
            let body = docs.list_documents(&path, self.page_size, token.as_deref())?;
            let page = ListPage::parse(&body).map_err(|e| {
                warn!("Scheduler: unreadable list response: {}", e);
                CloudError::InvalidResponse
            })?;
            pages += 1;

            for raw in page.documents.iter().cloned() {
                match Document::from_value(raw).and_then(|doc| Schedule::from_document(&doc)) {
                    Ok(schedule) => schedules.push(schedule),
                    Err(e) => {
                        skipped += 1;
                        warn!("Scheduler: skipping malformed schedule: {}", e);
                    }
                }
            }

            match page.next_token() {
                Some(next) if pages < MAX_PAGES => token = Some(next.to_owned()),
                Some(_) => {
                    warn!("Scheduler: page cap ({}) reached, remainder ignored", MAX_PAGES);
                    break;
                }
                None => break,
            }
        }

        let report = FetchReport {
            loaded: schedules.len(),
            skipped,
            pages,
        };
        Ok((schedules, report))
    }

    /// Whether the periodic fetch is due.
    pub fn fetch_due(&self, now_ms: u64) -> bool {
        self.next_fetch_ms.is_none_or(|due| now_ms >= due)
    }

    /// Run the periodic fetch if it is due.
    pub fn poll_fetch(
        &mut self,
        docs: &mut impl DocumentStore,
        identity: &str,
        now_ms: u64,
    ) -> Option<Result<FetchReport, CloudError>> {
        if !self.fetch_due(now_ms) {
            return None;
        }
        Some(self.fetch(docs, identity, now_ms))
    }

    /// Fire every schedule due in the current minute.
    ///
    /// No-op if called within the check interval of the previous
    /// evaluation, or while the wall clock is unsynchronised.  Returns the
    /// number of schedules fired.
    pub fn evaluate(
        &mut self,
        now_ms: u64,
        local: Option<NaiveDateTime>,
        delegate: &mut dyn SchedulerDelegate,
    ) -> usize {
        if let Some(last) = self.last_checked_ms {
            if now_ms.saturating_sub(last) < self.check_interval_ms {
                return 0;
            }
        }
        self.last_checked_ms = Some(now_ms);

        let Some(now) = local else {
            warn!("Scheduler: wall clock not synchronised, skipping evaluation");
            return 0;
        };

        let snapshot = self.snapshot();
        let mut fired = 0;
        for schedule in snapshot.iter().filter(|s| s.is_due(&now)) {
            info!(
                "Scheduler: '{}' due at {:02}:{:02} (bowl {}, {} g)",
                schedule.id, schedule.hour, schedule.minute, schedule.bowl, schedule.portion_grams
            );
            delegate.on_schedule_fired(schedule);
            fired += 1;
        }
        fired
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
