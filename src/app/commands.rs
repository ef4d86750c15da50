//! Inbound commands from the realtime channel.
//!
//! The backend writes one JSON object to `/commands/{identity}`:
//!
//! ```text
//! {"command": "feed", "timestamp": 1700000000000, "bowl": 1, "amount": 20}
//! {"command": "refetch_schedules", "timestamp": 1700000000500}
//! ```
//!
//! These are decoded into a [`CommandEnvelope`] that the
//! [`CommandProcessor`](crate::stream::CommandProcessor) filters and stages.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// What the backend is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Dispense `amount` grams into `bowl`.
    Feed,
    /// Re-pull the schedule collection now.
    RefetchSchedules,
    /// Anything this firmware does not understand.  Logged and ignored.
    Unknown(String),
}

impl CommandKind {
    fn from_wire(s: &str) -> Self {
        match s {
            "feed" => Self::Feed,
            "refetch_schedules" => Self::RefetchSchedules,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

/// One realtime instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub kind: CommandKind,
    /// Producer-assigned, monotonically increasing (server time in ms).
    pub timestamp: u64,
    pub bowl: Option<i64>,
    pub amount: Option<i64>,
}

#[derive(Deserialize)]
struct WireCommand {
    command: String,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    bowl: Option<i64>,
    #[serde(default)]
    amount: Option<i64>,
}

impl CommandEnvelope {
    /// Decode the root document of a command node.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self, ParseError> {
        if !doc.contains_key("command") {
            return Err(ParseError::MissingField("command"));
        }
        let wire: WireCommand = serde_json::from_value(Value::Object(doc.clone()))?;
        Ok(Self {
            kind: CommandKind::from_wire(&wire.command),
            timestamp: wire.timestamp,
            bowl: wire.bowl,
            amount: wire.amount,
        })
    }

    /// `(bowl, amount)` when both are present and positive.
    pub fn feed_target(&self) -> Option<(u32, u32)> {
        let bowl = u32::try_from(self.bowl?).ok().filter(|b| *b > 0)?;
        let amount = u32::try_from(self.amount?).ok().filter(|a| *a > 0)?;
        Some((bowl, amount))
    }
}
