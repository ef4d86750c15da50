//! Table-driven bring-up state machine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌────────────────┬───────────┬──────────────────────────┐   │
//! │  │ StateId        │ terminal  │ on_event                 │   │
//! │  ├────────────────┼───────────┼──────────────────────────┤   │
//! │  │ Provisioning   │ no        │ fn(ev) -> Option<State>  │   │
//! │  │ Connecting     │ no        │ fn(ev) -> Option<State>  │   │
//! │  │ Authenticating │ no        │ fn(ev) -> Option<State>  │   │
//! │  │ Registering    │ no        │ fn(ev) -> Option<State>  │   │
//! │  │ Operational    │ yes       │ fn(ev) -> Option<State>  │   │
//! │  │ Error          │ yes       │ fn(ev) -> Option<State>  │   │
//! │  └────────────────┴───────────┴──────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table only decides *where* to go.  Doing the work of a state (joining
//! the network, registering, ticking the schedule engine) belongs to the
//! [`Orchestrator`](crate::app::orchestrator::Orchestrator), which reports
//! what happened as a [`BringUpEvent`] and lets [`Fsm::dispatch`] move.
//!
//! Transitions only ever move forward through the bring-up order, so a
//! session can never loop back into registration.

pub mod states;

use log::{error, info};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every state the device can be in.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StateId {
    Provisioning = 0,
    Connecting = 1,
    Authenticating = 2,
    Registering = 3,
    Operational = 4,
    Error = 5,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [StateId; StateId::COUNT] = [
        Self::Provisioning,
        Self::Connecting,
        Self::Authenticating,
        Self::Registering,
        Self::Operational,
        Self::Error,
    ];

    /// Convert an index back to `StateId`.  Out of range maps to `Error`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Provisioning,
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::Registering,
            4 => Self::Operational,
            _ => {
                debug_assert!(idx == 5, "invalid state index: {idx}");
                Self::Error
            }
        }
    }

    /// Whether this state ends the bring-up sequence for the session.
    pub fn is_terminal(self) -> bool {
        states::descriptor(self).terminal
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Outcomes the orchestrator reports back to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpEvent {
    /// Station link is up.
    LinkUp,
    /// Connection attempt budget exhausted.
    LinkFailed,
    /// Backend session token obtained.
    TokenReady { identity_cached: bool },
    /// Registration completed and the identity is persisted.
    Registered,
    /// Registration failed at any step.
    RegistrationFailed,
    /// Persisted configuration is missing or unusable.
    Misconfigured,
}

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Per-state event handler.  Returns `Some(next)` to transition.
pub type StateEventFn = fn(BringUpEvent) -> Option<StateId>;

/// Static descriptor for a single state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    /// No event leads out of a terminal state.
    pub terminal: bool,
    pub on_event: StateEventFn,
}

/// Pure transition function: where `event` takes the machine from `state`.
pub fn transition(state: StateId, event: BringUpEvent) -> Option<StateId> {
    (states::descriptor(state).on_event)(event)
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(initial: StateId) -> Self {
        Self {
            table: states::build_state_table(),
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Count one orchestrator tick.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
    }

    /// Feed an event to the current state.  Returns the new state if the
    /// event caused a transition.
    pub fn dispatch(&mut self, event: BringUpEvent) -> Option<StateId> {
        let from = &self.table[self.current];
        let Some(next) = (from.on_event)(event) else {
            info!("FSM: {} ignores {:?}", from.name, event);
            return None;
        };

        let next_idx = next as usize;
        info!("FSM transition: {} -> {}", from.name, self.table[next_idx].name);
        if next == StateId::Error {
            error!("FSM: bring-up halted by {:?}", event);
        }
        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        Some(next)
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// How many ticks the machine has spent in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count.wrapping_sub(self.state_entry_tick)
    }
}
