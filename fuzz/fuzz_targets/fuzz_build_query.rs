//! Fuzz target for oplog query construction.
//!
//! Arbitrary start positions and filters must never panic, and a bounded
//! query always carries the exclusive position bound.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mongodb::bson::{Bson, Document, Timestamp};
use oplog_tailer::build_query;
use oplog_tailer::driver::Namespace;

fuzz_target!(|data: (u32, u32, Vec<(String, i64)>, Option<(String, String)>)| {
    let (time, increment, fields, ns) = data;

    let filter: Document = fields.into_iter().map(|(k, v)| (k, Bson::Int64(v))).collect();
    let from = Bson::Timestamp(Timestamp { time, increment });
    let namespace = ns.map(|(db, coll)| Namespace::new(db, coll));

    let Ok(query) = build_query(Some(&from), Some(filter), namespace.as_ref()) else {
        panic!("timestamp start positions are always accepted");
    };
    let bound = query.get_document("ts").expect("bounded query has ts");
    assert_eq!(bound.get("$gt"), Some(&from));
});
