//! Per-state event handlers and the table builder.
//!
//! Each state is a plain `fn` pointer: no closures, no dynamic dispatch,
//! no heap.
//!
//! ```text
//!  PROVISIONING ··(credentials saved)··▶ restart
//!
//!  CONNECTING ──[link up]──▶ AUTHENTICATING ──[token, identity cached]──▶ OPERATIONAL
//!      │                          │                                           ▲
//!  [link failed]          [token, no identity]                                │
//!      │                          ▼                                           │
//!      │                    REGISTERING ─────────────[registered]─────────────┘
//!      │                          │
//!      ▼                  [registration failed]
//!    ERROR ◀──────────────────────┘
//!
//!  CONNECTING / AUTHENTICATING / REGISTERING ──[misconfigured]──▶ ERROR
//! ```

use super::{BringUpEvent, StateDescriptor, StateId};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

static STATE_TABLE: [StateDescriptor; StateId::COUNT] = build_state_table();

/// Build the state table.
pub const fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // 0: Provisioning
        StateDescriptor {
            id: StateId::Provisioning,
            name: "Provisioning",
            terminal: false,
            on_event: provisioning_event,
        },
        // 1: Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            terminal: false,
            on_event: connecting_event,
        },
        // 2: Authenticating
        StateDescriptor {
            id: StateId::Authenticating,
            name: "Authenticating",
            terminal: false,
            on_event: authenticating_event,
        },
        // 3: Registering
        StateDescriptor {
            id: StateId::Registering,
            name: "Registering",
            terminal: false,
            on_event: registering_event,
        },
        // 4: Operational
        StateDescriptor {
            id: StateId::Operational,
            name: "Operational",
            terminal: true,
            on_event: terminal_event,
        },
        // 5: Error
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            terminal: true,
            on_event: terminal_event,
        },
    ]
}

/// Row for `id` in the shared table.
pub fn descriptor(id: StateId) -> &'static StateDescriptor {
    &STATE_TABLE[id as usize]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Saved credentials are applied by a restart, not by a transition.
fn provisioning_event(_event: BringUpEvent) -> Option<StateId> {
    None
}

fn connecting_event(event: BringUpEvent) -> Option<StateId> {
    match event {
        BringUpEvent::LinkUp => Some(StateId::Authenticating),
        BringUpEvent::LinkFailed | BringUpEvent::Misconfigured => Some(StateId::Error),
        _ => None,
    }
}

fn authenticating_event(event: BringUpEvent) -> Option<StateId> {
    match event {
        BringUpEvent::TokenReady { identity_cached: true } => Some(StateId::Operational),
        BringUpEvent::TokenReady { identity_cached: false } => Some(StateId::Registering),
        BringUpEvent::Misconfigured => Some(StateId::Error),
        _ => None,
    }
}

fn registering_event(event: BringUpEvent) -> Option<StateId> {
    match event {
        BringUpEvent::Registered => Some(StateId::Operational),
        BringUpEvent::RegistrationFailed | BringUpEvent::Misconfigured => Some(StateId::Error),
        _ => None,
    }
}

fn terminal_event(_event: BringUpEvent) -> Option<StateId> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_are_indexed_by_id() {
        for (i, row) in build_state_table().iter().enumerate() {
            assert_eq!(row.id as usize, i, "row {} holds {}", i, row.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let table = build_state_table();
        for a in &table {
            assert_eq!(table.iter().filter(|b| b.name == a.name).count(), 1);
        }
    }
}
