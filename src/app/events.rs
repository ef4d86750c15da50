//! Outbound application events.
//!
//! The [`Orchestrator`](super::orchestrator::Orchestrator) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them: log to serial, count them in
//! a test, forward them somewhere.

use crate::actuation::DispenseOutcome;
use crate::fsm::StateId;
use crate::scheduler::FetchReport;

/// What triggered a dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Schedule,
    Command { timestamp: u64 },
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The orchestrator booted (carries the initial state).
    Started(StateId),

    /// The bring-up machine transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Registration produced a new identity.
    Registered { identity: String },

    /// A schedule fetch replaced the cache.
    SchedulesLoaded(FetchReport),

    /// A cached schedule matched the current minute.
    ScheduleTriggered { id: String, bowl: u32, grams: u32 },

    /// A feed command passed validation and was staged.
    FeedAccepted { timestamp: u64, bowl: u32, grams: u32 },

    /// A dispense cycle finished (or was dropped for an unknown bowl).
    Dispensed { source: FeedSource, outcome: DispenseOutcome },

    /// The realtime channel was (re)opened.
    StreamConnected { reconnect: bool },

    /// The realtime channel closed and will be reopened next tick.
    StreamLost,
}
