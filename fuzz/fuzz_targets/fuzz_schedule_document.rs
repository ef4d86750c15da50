//! Fuzz target: Firestore schedule decoding.
//!
//! Arbitrary JSON is run through `Document::from_value` and
//! `Schedule::from_document`; anything accepted must be a usable schedule.
//!
//! cargo fuzz run fuzz_schedule_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use pawfeed::cloud::firestore::Document;
use pawfeed::scheduler::Schedule;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let Ok(doc) = Document::from_value(value) else {
        return;
    };
    if let Ok(schedule) = Schedule::from_document(&doc) {
        assert!(schedule.bowl > 0);
        assert!(schedule.portion_grams > 0);
        assert!(schedule.hour < 24 && schedule.minute < 60);
        assert!(!schedule.id.is_empty());
    }
});
