//! Fuzz target for log position parsing and ordering.
//!
//! This tests that position parsing never panics on arbitrary input
//! and that accepted positions keep their ordering invariants.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oplog_tailer::LogPosition;
use std::cmp::Ordering;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;

    // Should never panic
    let (Ok(pa), Ok(pb)) = (a.parse::<LogPosition>(), b.parse::<LogPosition>()) else {
        return;
    };

    // Accepted positions print back to something that parses identically
    assert_eq!(pa.to_string().parse::<LogPosition>().ok(), Some(pa));

    // Ordering follows (seconds, ordinal)
    assert_eq!(pa.cmp(&pb), (pa.seconds, pa.ordinal).cmp(&(pb.seconds, pb.ordinal)));
    match pa.cmp(&pb) {
        Ordering::Less => assert_eq!(pb.cmp(&pa), Ordering::Greater),
        Ordering::Greater => assert_eq!(pb.cmp(&pa), Ordering::Less),
        Ordering::Equal => assert_eq!(pa, pb),
    }
});
