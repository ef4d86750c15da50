//! Realtime Database event-stream framing.
//!
//! A streaming `GET` with `Accept: text/event-stream` yields server-sent
//! events:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"command":"feed","timestamp":1700000000000,"bowl":1,"amount":20}}
//!
//! event: keep-alive
//! data: null
//! ```
//!
//! [`SseParser`] is fed arbitrary byte chunks (as they come off the socket)
//! and yields complete [`StreamEvent`]s.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Longest accepted line.  Longer lines are dropped whole.
pub const MAX_LINE_LEN: usize = 4096;

/// One event observed on the command channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A node (or subtree) at `path` was replaced by `data`.
    Put { path: String, data: Value },
    /// Children of `path` were merged with `data`.
    Patch { path: String, data: Value },
    /// Server heartbeat.
    KeepAlive,
    /// The server closed the stream (rules changed, node gone).
    Cancelled,
    /// The session token expired.
    AuthRevoked,
    /// No traffic (not even keep-alives) within the read timeout.
    Timeout,
}

impl StreamEvent {
    /// The payload if this is a whole-document replacement at the stream root.
    pub fn root_document(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Put { path, data } if path == "/" => data.as_object(),
            _ => None,
        }
    }

    /// Whether this event ends the stream.
    pub fn closes_stream(&self) -> bool {
        matches!(self, Self::Cancelled | Self::AuthRevoked | Self::Timeout)
    }
}

#[derive(Deserialize)]
struct ChangePayload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    line: Vec<u8>,
    discarding: bool,
    event: Option<String>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and append every completed event to `out`.
    pub fn push(&mut self, bytes: &[u8], out: &mut Vec<StreamEvent>) {
        for &b in bytes {
            if b == b'\n' {
                if !self.discarding {
                    let line = core::mem::take(&mut self.line);
                    self.finish_line(&line, out);
                }
                self.line.clear();
                self.discarding = false;
            } else if self.discarding {
                continue;
            } else if self.line.len() >= MAX_LINE_LEN {
                warn!("Stream: dropping oversized line (> {} bytes)", MAX_LINE_LEN);
                self.line.clear();
                self.discarding = true;
            } else {
                self.line.push(b);
            }
        }
    }

    fn finish_line(&mut self, raw: &[u8], out: &mut Vec<StreamEvent>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            self.dispatch(out);
            return;
        }
        if raw[0] == b':' {
            return; // comment
        }
        let Ok(line) = core::str::from_utf8(raw) else {
            warn!("Stream: non-UTF-8 line ignored");
            return;
        };
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<StreamEvent>) {
        let event = self.event.take();
        let data = core::mem::take(&mut self.data);

        let parsed = match event.as_deref() {
            Some("put") => decode_change(&data).map(|(path, data)| StreamEvent::Put { path, data }),
            Some("patch") => {
                decode_change(&data).map(|(path, data)| StreamEvent::Patch { path, data })
            }
            Some("keep-alive") => Some(StreamEvent::KeepAlive),
            Some("cancel") => Some(StreamEvent::Cancelled),
            Some("auth_revoked") => Some(StreamEvent::AuthRevoked),
            Some(other) => {
                debug!("Stream: ignoring event type '{}'", other);
                None
            }
            None => None,
        };
        if let Some(ev) = parsed {
            out.push(ev);
        }
    }
}

fn decode_change(data: &str) -> Option<(String, Value)> {
    match serde_json::from_str::<ChangePayload>(data) {
        Ok(p) => Some((p.path, p.data)),
        Err(e) => {
            warn!("Stream: malformed change payload: {}", e);
            None
        }
    }
}
