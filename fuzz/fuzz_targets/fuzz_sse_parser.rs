//! Fuzz target: `SseParser::push`
//!
//! Feeds arbitrary bytes in two chunks split at a data-derived point and
//! checks the result does not depend on where the split fell.
//!
//! cargo fuzz run fuzz_sse_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use pawfeed::cloud::rtdb::SseParser;

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    SseParser::new().push(data, &mut whole);

    let cut = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut parser = SseParser::new();
    let mut split = Vec::new();
    parser.push(&data[..cut], &mut split);
    parser.push(&data[cut..], &mut split);

    assert_eq!(whole, split, "chunk boundary changed the decoded events");
});
