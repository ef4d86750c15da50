//! Fuzz target: command decoding and the feed acceptance rules.
//!
//! Any JSON object may arrive on the command node.  Decoding must never
//! panic, and a staged feed must always carry a positive bowl and amount.
//!
//! cargo fuzz run fuzz_command_envelope

#![no_main]

use critical_section as _;
use libfuzzer_sys::fuzz_target;
use pawfeed::app::commands::CommandEnvelope;
use pawfeed::stream::{CommandProcessor, Ingest};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(Value::Object(doc)) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let Ok(envelope) = CommandEnvelope::from_document(&doc) else {
        return;
    };

    let mut processor = CommandProcessor::new();
    if let Ingest::Staged(request) = processor.accept_feed(&envelope) {
        assert!(request.bowl > 0 && request.grams > 0);
        assert_eq!(request.timestamp, envelope.timestamp);
        // The same command twice is never staged twice.
        assert!(!matches!(processor.accept_feed(&envelope), Ingest::Staged(_)));
    }
});
