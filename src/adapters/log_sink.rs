//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::actuation::DispenseOutcome;
use crate::app::events::{AppEvent, FeedSource};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] as a single structured line.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn source_label(source: &FeedSource) -> String {
    match source {
        FeedSource::Schedule => "schedule".into(),
        FeedSource::Command { timestamp } => format!("command@{timestamp}"),
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::Registered { identity } => {
                info!("IDENT | registered as {}", identity);
            }
            AppEvent::SchedulesLoaded(report) => {
                info!(
                    "SCHED | loaded={} skipped={} pages={}",
                    report.loaded, report.skipped, report.pages
                );
            }
            AppEvent::ScheduleTriggered { id, bowl, grams } => {
                info!("SCHED | fired '{}' bowl={} grams={}", id, bowl, grams);
            }
            AppEvent::FeedAccepted {
                timestamp,
                bowl,
                grams,
            } => {
                info!("FEED | accepted ts={} bowl={} grams={}", timestamp, bowl, grams);
            }
            AppEvent::Dispensed { source, outcome } => match outcome {
                DispenseOutcome::Dispensed {
                    bowl,
                    grams,
                    duration_ms,
                } => info!(
                    "FEED | {} bowl={} grams={} held={}ms",
                    source_label(source),
                    bowl,
                    grams,
                    duration_ms
                ),
                DispenseOutcome::UnknownBowl(bowl) => {
                    warn!("FEED | {} dropped, no bowl {}", source_label(source), bowl);
                }
            },
            AppEvent::StreamConnected { reconnect } => {
                info!("STREAM | {}", if *reconnect { "reconnected" } else { "connected" });
            }
            AppEvent::StreamLost => {
                info!("STREAM | lost, reopening next tick");
            }
        }
    }
}
