// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Oplog scan query construction.
//!
//! ```text
//! filter            from           namespace        query
//! ──────            ────           ─────────        ─────
//! F                 -              (ignored)        F
//! F                 p              -                F + { ts: { $gt: p } }
//! F                 p              db.coll          F + { ts: { $gt: p }, ns: "db.coll" }
//! ```
//!
//! The `ts` bound is exclusive so replaying a seen position never re-emits
//! it. When the caller's filter carries its own `ts` or `ns` clause, the
//! builder's clause replaces it.

use crate::driver::Namespace;
use crate::error::Result;
use crate::position::{LogPosition, NAMESPACE_FIELD, POSITION_FIELD};
use mongodb::bson::{doc, Bson, Document};
use tracing::debug;

/// Build the oplog predicate for a tail session.
///
/// `from` must be a BSON timestamp; anything else fails with
/// [`TailerError::InvalidPosition`](crate::TailerError::InvalidPosition).
/// `namespace` only applies alongside a `from` bound.
pub fn build_query(
    from: Option<&Bson>,
    filter: Option<Document>,
    namespace: Option<&Namespace>,
) -> Result<Document> {
    let mut query = filter.unwrap_or_default();

    let Some(from) = from else {
        return Ok(query);
    };

    let position = LogPosition::try_from(from)?;
    query.insert(POSITION_FIELD, doc! { "$gt": Bson::from(position) });

    if let Some(ns) = namespace {
        query.insert(NAMESPACE_FIELD, ns.to_string());
    }

    debug!(from = %position, query = %query, "Built oplog query");
    Ok(query)
}

/// Whether a query carries a position bound (enables the oplog replay hint).
pub fn has_position_bound(query: &Document) -> bool {
    query.contains_key(POSITION_FIELD)
}
