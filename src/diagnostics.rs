// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Oplog inspection helpers used to pick a starting position.

use crate::driver::{Namespace, Upstream};
use crate::error::Result;
use crate::position::{epoch_seconds, POSITION_FIELD};
use mongodb::bson::{doc, Document, Timestamp};
use std::time::SystemTime;
use tracing::debug;

/// Read the newest oplog entry, or the newest one at or before `before_time`.
///
/// "At or before" is second-granular: the bound is `ts < (before + 1, 0)`.
/// Returns `None` on an empty oplog.
pub async fn latest_oplog_entry(
    upstream: &dyn Upstream,
    oplog: &Namespace,
    before_time: Option<SystemTime>,
) -> Result<Option<Document>> {
    let filter = before_filter(before_time);
    debug!(oplog = %oplog, filter = %filter, "Reading latest oplog entry");
    upstream
        .find_one(oplog.clone(), filter, doc! { "$natural": -1 })
        .await
}

/// Filter selecting entries in or before the second of `before_time`.
///
/// Times past the timestamp range clamp to its last second, which is then
/// included whole via `$lte` on the largest timestamp.
fn before_filter(before_time: Option<SystemTime>) -> Document {
    let Some(time) = before_time else {
        return Document::new();
    };

    let bound = match epoch_seconds(time).checked_add(1) {
        Some(next) => doc! { "$lt": Timestamp { time: next, increment: 0 } },
        None => doc! { "$lte": Timestamp { time: u32::MAX, increment: u32::MAX } },
    };
    let mut filter = Document::new();
    filter.insert(POSITION_FIELD, bound);
    filter
}
