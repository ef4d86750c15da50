//! Command stream processor.
//!
//! Consumes realtime channel events, filters stale or malformed commands,
//! stages feed requests for the next tick and acknowledges work by clearing
//! the backend node.
//!
//! ```text
//!  RealtimePort::read_stream ──▶ on_event ──┬─ feed ──▶ PendingSlot (capacity 1)
//!                                           │                │ next tick
//!                                           │                ▼
//!                                           │         drain_pending ──▶ dispense ──▶ delete_node
//!                                           │
//!                                           └─ refetch_schedules ──▶ fetch ──▶ set_null
//! ```
//!
//! De-duplication rests on one invariant: a feed is accepted only if its
//! timestamp is strictly greater than `last_processed_timestamp`, which is
//! advanced at acceptance time, before the dispense runs.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, info, warn};

use crate::actuation::{ActuationController, DispenseOutcome};
use crate::app::commands::{CommandEnvelope, CommandKind};
use crate::app::ports::{CloudError, DocumentStore, RealtimePort};
use crate::cloud::rtdb::StreamEvent;
use crate::error::Error;
use crate::scheduler::{FetchReport, ScheduleEngine};

// ───────────────────────────────────────────────────────────────
// Pending command handoff
// ───────────────────────────────────────────────────────────────

/// A validated feed waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRequest {
    pub timestamp: u64,
    pub bowl: u32,
    pub grams: u32,
}

/// Single-slot handoff from the stream context to the control loop.
///
/// Staging while a request is already waiting overwrites it.  The
/// overwritten request is always older (timestamps only grow), so only the
/// newest command survives a burst.
pub struct PendingSlot {
    slot: Signal<CriticalSectionRawMutex, FeedRequest>,
}

impl PendingSlot {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    /// Stage `request`.  Returns `true` if an older request was replaced.
    pub fn stage(&self, request: FeedRequest) -> bool {
        let replaced = self.slot.signaled();
        self.slot.signal(request);
        replaced
    }

    pub fn take(&self) -> Option<FeedRequest> {
        self.slot.try_take()
    }

    pub fn is_staged(&self) -> bool {
        self.slot.signaled()
    }
}

impl Default for PendingSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Channel state
// ───────────────────────────────────────────────────────────────

/// Realtime channel subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No stream open; reopened on the next operational tick.
    Inactive,
    /// Stream open since `since_ms` (uptime).
    Active { since_ms: u64 },
}

// ───────────────────────────────────────────────────────────────
// Ingestion results
// ───────────────────────────────────────────────────────────────

/// Why an event produced no work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Heartbeats, child-path updates, node cleared, etc.
    NotRootDocument,
    /// Root document that is not a command envelope.
    Malformed,
    /// Feed with `timestamp <= last_processed_timestamp`.
    Stale { timestamp: u64, last: u64 },
    /// Feed without a positive bowl and amount.
    InvalidFeed,
    /// Command kind this firmware does not handle.
    UnknownKind(String),
}

/// What one stream event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// A feed was accepted and staged.
    Staged(FeedRequest),
    /// A schedule refetch ran.
    Refetched(Result<FetchReport, CloudError>),
    /// The stream ended (timeout, cancel, token revoked).
    ChannelClosed,
    Ignored(IgnoreReason),
}

/// Result of processing one staged feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub request: FeedRequest,
    pub outcome: Result<DispenseOutcome, Error>,
    /// Whether the backend node was deleted.
    pub acknowledged: bool,
}

// ───────────────────────────────────────────────────────────────
// Processor
// ───────────────────────────────────────────────────────────────

pub struct CommandProcessor {
    last_processed_timestamp: u64,
    pending: PendingSlot,
    channel: ChannelState,
    opened_count: u32,
}

impl CommandProcessor {
    pub fn new() -> Self {
        Self {
            last_processed_timestamp: 0,
            pending: PendingSlot::new(),
            channel: ChannelState::Inactive,
            opened_count: 0,
        }
    }

    // ── Channel lifecycle ─────────────────────────────────────

    /// Open the stream on `path` unless it is already active.
    /// Returns `Ok(true)` if it was (re)opened by this call.
    pub fn ensure_channel(
        &mut self,
        realtime: &mut impl RealtimePort,
        path: &str,
        now_ms: u64,
    ) -> Result<bool, CloudError> {
        if self.is_active() {
            return Ok(false);
        }
        realtime.begin_stream(path)?;
        self.channel = ChannelState::Active { since_ms: now_ms };
        self.opened_count = self.opened_count.saturating_add(1);
        if self.opened_count > 1 {
            info!("Stream: reconnected to {} (#{})", path, self.opened_count - 1);
        } else {
            info!("Stream: listening on {}", path);
        }
        Ok(true)
    }

    /// Timeout / read failure: the next operational tick reopens.
    /// Returns how long the closed stream had been open.
    pub fn mark_inactive(&mut self, reason: &str, now_ms: u64) -> Option<u64> {
        let ChannelState::Active { since_ms } = self.channel else {
            return None;
        };
        let open_for = now_ms.saturating_sub(since_ms);
        warn!("Stream: channel inactive after {} s ({})", open_for / 1000, reason);
        self.channel = ChannelState::Inactive;
        Some(open_for)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.channel, ChannelState::Active { .. })
    }

    pub fn channel(&self) -> ChannelState {
        self.channel
    }

    /// How many times the stream has been opened (first open included).
    pub fn opened_count(&self) -> u32 {
        self.opened_count
    }

    // ── Ingestion ─────────────────────────────────────────────

    /// Read whatever arrived on the stream and handle each event.
    pub fn service_stream<C: DocumentStore + RealtimePort>(
        &mut self,
        cloud: &mut C,
        schedules: &mut ScheduleEngine,
        identity: &str,
        now_ms: u64,
    ) -> Vec<Ingest> {
        if !self.is_active() {
            return Vec::new();
        }
        match RealtimePort::read_stream(cloud) {
            Ok(events) => events
                .iter()
                .map(|ev| self.on_event(ev, cloud, schedules, identity, now_ms))
                .collect(),
            Err(e) => {
                self.mark_inactive(&format!("read failed: {e}"), now_ms);
                vec![Ingest::ChannelClosed]
            }
        }
    }

    /// Handle one event, running a refetch inline when asked to.
    pub fn on_event<C: DocumentStore + RealtimePort>(
        &mut self,
        event: &StreamEvent,
        cloud: &mut C,
        schedules: &mut ScheduleEngine,
        identity: &str,
        now_ms: u64,
    ) -> Ingest {
        if event.closes_stream() {
            let reason = match event {
                StreamEvent::Timeout => "timeout",
                StreamEvent::AuthRevoked => "auth revoked",
                _ => "cancelled by server",
            };
            self.mark_inactive(reason, now_ms);
            return Ingest::ChannelClosed;
        }

        let envelope = match self.decode(event) {
            Ok(envelope) => envelope,
            Err(reason) => return Ingest::Ignored(reason),
        };

        match envelope.kind {
            CommandKind::Feed => self.accept_feed(&envelope),
            CommandKind::RefetchSchedules => {
                info!("Stream: refetch requested");
                let result = schedules.fetch(cloud, identity, now_ms);
                let node = crate::cloud::command_path(identity);
                if let Err(e) = cloud.set_null(&node) {
                    warn!("Stream: could not clear {} after refetch: {}", node, e);
                }
                Ingest::Refetched(result)
            }
            CommandKind::Unknown(kind) => {
                info!("Stream: ignoring unsupported command '{}'", kind);
                Ingest::Ignored(IgnoreReason::UnknownKind(kind))
            }
        }
    }

    fn decode(&self, event: &StreamEvent) -> Result<CommandEnvelope, IgnoreReason> {
        let Some(doc) = event.root_document() else {
            debug!("Stream: ignoring non-root event");
            return Err(IgnoreReason::NotRootDocument);
        };
        CommandEnvelope::from_document(doc).map_err(|e| {
            warn!("Stream: malformed command: {}", e);
            IgnoreReason::Malformed
        })
    }

    /// Apply the ordering and validity rules to a feed and stage it.
    pub fn accept_feed(&mut self, envelope: &CommandEnvelope) -> Ingest {
        let last = self.last_processed_timestamp;
        if envelope.timestamp <= last {
            debug!("Stream: stale feed {} (last {})", envelope.timestamp, last);
            return Ingest::Ignored(IgnoreReason::Stale {
                timestamp: envelope.timestamp,
                last,
            });
        }
        let Some((bowl, grams)) = envelope.feed_target() else {
            warn!(
                "Stream: feed {} without positive bowl/amount ({:?}/{:?})",
                envelope.timestamp, envelope.bowl, envelope.amount
            );
            return Ingest::Ignored(IgnoreReason::InvalidFeed);
        };

        self.last_processed_timestamp = envelope.timestamp;
        let request = FeedRequest {
            timestamp: envelope.timestamp,
            bowl,
            grams,
        };
        if self.pending.stage(request) {
            info!("Stream: feed {} replaced an undrained request", request.timestamp);
        } else {
            info!("Stream: feed {} staged (bowl {}, {} g)", request.timestamp, bowl, grams);
        }
        Ingest::Staged(request)
    }

    // ── Processing ────────────────────────────────────────────

    /// Dispense the staged feed, if any, then delete the command node.
    pub fn drain_pending<P: SetDutyCycle, D: DelayNs>(
        &mut self,
        actuation: &mut ActuationController<P, D>,
        realtime: &mut impl RealtimePort,
        identity: &str,
    ) -> Option<Drained> {
        let request = self.pending.take()?;
        let outcome = actuation.dispense(request.bowl, request.grams);
        if let Err(e) = &outcome {
            warn!("Stream: feed {} failed: {}", request.timestamp, e);
        }

        let node = crate::cloud::command_path(identity);
        let acknowledged = match realtime.delete_node(&node) {
            Ok(()) => true,
            Err(e) => {
                warn!("Stream: could not delete {}: {}", node, e);
                false
            }
        };

        Some(Drained {
            request,
            outcome,
            acknowledged,
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_staged()
    }

    pub fn last_processed_timestamp(&self) -> u64 {
        self.last_processed_timestamp
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}
