// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory oplog for testing the tailer without a MongoDB server.
//!
//! `MockUpstream` holds an append-only list of oplog entries and answers
//! `isMaster`, `find_one` and `find` against it. Cursors share the entry
//! list, so entries appended after a cursor ran dry show up on the next
//! `has_next`, like a tailable cursor would.

#![allow(dead_code)] // Not every test binary uses every helper

use mongodb::bson::{doc, Bson, Document, Timestamp};
use oplog_tailer::driver::{BoxFuture, CursorOptions, Namespace, OpenRequest, OplogCursor, OplogDriver, Upstream};
use oplog_tailer::TailerError;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A recorded `find` call.
#[derive(Debug, Clone)]
pub struct FindCall {
    pub ns: Namespace,
    pub filter: Document,
    pub options: CursorOptions,
}

/// A recorded `find_one` call.
#[derive(Debug, Clone)]
pub struct FindOneCall {
    pub ns: Namespace,
    pub filter: Document,
    pub sort: Document,
}

/// Build an oplog entry at `(seconds, ordinal)`.
pub fn oplog_entry(seconds: u32, ordinal: u32, ns: &str, op: &str) -> Document {
    doc! {
        "ts": Timestamp { time: seconds, increment: ordinal },
        "op": op,
        "ns": ns,
        "o": { "_id": format!("{}-{}", seconds, ordinal) },
    }
}

/// `isMaster` reply of a replica set secondary.
pub fn secondary_reply() -> Document {
    doc! { "ismaster": false, "secondary": true, "setName": "rs0", "ok": 1.0 }
}

/// `isMaster` reply of a replica set primary.
pub fn primary_reply() -> Document {
    doc! { "ismaster": true, "isWritablePrimary": true, "setName": "rs0", "ok": 1.0 }
}

/// `isMaster` reply of a standalone server.
pub fn standalone_reply() -> Document {
    doc! { "ismaster": true, "ok": 1.0 }
}

/// In-memory upstream with a configurable `isMaster` reply.
pub struct MockUpstream {
    address: String,
    is_master: Mutex<Option<Document>>,
    entries: Arc<Mutex<Vec<Document>>>,
    finds: Mutex<Vec<FindCall>>,
    find_ones: Mutex<Vec<FindOneCall>>,
    admin_commands: Mutex<Vec<Document>>,
    /// Cursors fail `has_next` once they have handed out this many records.
    fail_after: Mutex<Option<usize>>,
    fail_close: Mutex<bool>,
    closed_cursors: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn new(address: &str, is_master: Document) -> Self {
        Self {
            address: address.to_string(),
            is_master: Mutex::new(Some(is_master)),
            entries: Arc::new(Mutex::new(Vec::new())),
            finds: Mutex::new(Vec::new()),
            find_ones: Mutex::new(Vec::new()),
            admin_commands: Mutex::new(Vec::new()),
            fail_after: Mutex::new(None),
            fail_close: Mutex::new(false),
            closed_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn secondary(address: &str) -> Self {
        Self::new(address, secondary_reply())
    }

    pub fn primary(address: &str) -> Self {
        Self::new(address, primary_reply())
    }

    pub fn standalone(address: &str) -> Self {
        Self::new(address, standalone_reply())
    }

    /// An upstream whose admin commands fail, as if no server answered.
    pub fn unreachable(address: &str) -> Self {
        let mock = Self::secondary(address);
        *mock.is_master.lock().unwrap() = None;
        mock
    }

    /// A secondary pre-loaded with `entries`, as an `Arc` ready for a tailer.
    pub fn with_entries(entries: Vec<Document>) -> Arc<Self> {
        let mock = Self::secondary("mock:27017");
        mock.append(entries);
        Arc::new(mock)
    }

    pub fn append(&self, entries: impl IntoIterator<Item = Document>) {
        self.entries.lock().unwrap().extend(entries);
    }

    pub fn fail_after(&self, records: usize) {
        *self.fail_after.lock().unwrap() = Some(records);
    }

    pub fn fail_close(&self) {
        *self.fail_close.lock().unwrap() = true;
    }

    pub fn finds(&self) -> Vec<FindCall> {
        self.finds.lock().unwrap().clone()
    }

    pub fn find_ones(&self) -> Vec<FindOneCall> {
        self.find_ones.lock().unwrap().clone()
    }

    pub fn admin_commands(&self) -> Vec<Document> {
        self.admin_commands.lock().unwrap().clone()
    }

    pub fn closed_cursors(&self) -> usize {
        self.closed_cursors.load(Ordering::SeqCst)
    }
}

impl Upstream for MockUpstream {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn admin_command(&self, command: Document) -> BoxFuture<'_, Document> {
        Box::pin(async move {
            self.admin_commands.lock().unwrap().push(command);
            self.is_master
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TailerError::driver_msg("admin command", "No suitable servers found"))
        })
    }

    fn find_one(&self, ns: Namespace, filter: Document, sort: Document) -> BoxFuture<'_, Option<Document>> {
        Box::pin(async move {
            self.find_ones.lock().unwrap().push(FindOneCall {
                ns,
                filter: filter.clone(),
                sort: sort.clone(),
            });

            let entries = self.entries.lock().unwrap();
            let newest_first = matches!(sort.get("$natural"), Some(Bson::Int32(-1)) | Some(Bson::Int64(-1)));
            let found = if newest_first {
                entries.iter().rev().find(|entry| matches_filter(entry, &filter)).cloned()
            } else {
                entries.iter().find(|entry| matches_filter(entry, &filter)).cloned()
            };
            Ok(found)
        })
    }

    fn find(&self, ns: Namespace, filter: Document, options: CursorOptions) -> BoxFuture<'_, Box<dyn OplogCursor>> {
        Box::pin(async move {
            self.finds.lock().unwrap().push(FindCall {
                ns,
                filter: filter.clone(),
                options,
            });

            Ok(Box::new(MockCursor {
                entries: Arc::clone(&self.entries),
                filter,
                scanned: 0,
                peeked: None,
                handed_out: 0,
                fail_after: *self.fail_after.lock().unwrap(),
                fail_close: *self.fail_close.lock().unwrap(),
                closed: Arc::clone(&self.closed_cursors),
            }) as Box<dyn OplogCursor>)
        })
    }
}

/// Cursor over the shared entry list.
struct MockCursor {
    entries: Arc<Mutex<Vec<Document>>>,
    filter: Document,
    scanned: usize,
    peeked: Option<Document>,
    handed_out: usize,
    fail_after: Option<usize>,
    fail_close: bool,
    closed: Arc<AtomicUsize>,
}

impl MockCursor {
    fn advance(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        let entries = self.entries.lock().unwrap();
        while self.scanned < entries.len() {
            let entry = &entries[self.scanned];
            self.scanned += 1;
            if matches_filter(entry, &self.filter) {
                self.peeked = Some(entry.clone());
                return true;
            }
        }
        false
    }
}

impl OplogCursor for MockCursor {
    fn has_next(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if self.fail_after.is_some_and(|n| self.handed_out >= n) {
                return Err(TailerError::driver_msg("getMore", "cursor killed"));
            }
            Ok(self.advance())
        })
    }

    fn next(&mut self) -> BoxFuture<'_, Document> {
        Box::pin(async move {
            if !self.advance() {
                return Err(TailerError::driver_msg("next", "cursor exhausted"));
            }
            self.handed_out += 1;
            self.peeked
                .take()
                .ok_or_else(|| TailerError::driver_msg("next", "cursor exhausted"))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(TailerError::driver_msg("killCursors", "connection reset"));
            }
            Ok(())
        })
    }
}

/// Driver that hands out a fixed upstream and records what it was asked for.
pub struct MockDriver {
    upstream: Arc<MockUpstream>,
    requests: Mutex<Vec<OpenRequest>>,
}

impl MockDriver {
    pub fn new(upstream: Arc<MockUpstream>) -> Self {
        Self {
            upstream,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl OplogDriver for MockDriver {
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, Arc<dyn Upstream>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            Ok(Arc::clone(&self.upstream) as Arc<dyn Upstream>)
        })
    }
}

/// Evaluate the subset of MongoDB filters the tailer produces: equality,
/// plus `$gt`/`$gte`/`$lt`/`$lte` on comparable values.
pub fn matches_filter(entry: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        let value = entry.get(key);
        match condition {
            Bson::Document(ops) if ops.keys().all(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, bound)| {
                    let Some(ordering) = value.and_then(|v| compare(v, bound)) else {
                        return false;
                    };
                    match op.as_str() {
                        "$gt" => ordering == CmpOrdering::Greater,
                        "$gte" => ordering != CmpOrdering::Less,
                        "$lt" => ordering == CmpOrdering::Less,
                        "$lte" => ordering != CmpOrdering::Greater,
                        _ => false,
                    }
                })
            }
            expected => value == Some(expected),
        }
    })
}

fn compare(a: &Bson, b: &Bson) -> Option<CmpOrdering> {
    match (a, b) {
        (Bson::Timestamp(a), Bson::Timestamp(b)) => Some((a.time, a.increment).cmp(&(b.time, b.increment))),
        (Bson::Int32(a), Bson::Int32(b)) => Some(a.cmp(b)),
        (Bson::Int64(a), Bson::Int64(b)) => Some(a.cmp(b)),
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_filter_timestamp_bounds() {
        let entry = oplog_entry(100, 1, "app.users", "i");
        assert!(matches_filter(&entry, &doc! { "ts": { "$gt": Timestamp { time: 100, increment: 0 } } }));
        assert!(!matches_filter(&entry, &doc! { "ts": { "$gt": Timestamp { time: 100, increment: 1 } } }));
        assert!(matches_filter(&entry, &doc! { "ts": { "$lt": Timestamp { time: 101, increment: 0 } } }));
    }

    #[test]
    fn test_matches_filter_equality() {
        let entry = oplog_entry(100, 1, "app.users", "i");
        assert!(matches_filter(&entry, &doc! { "ns": "app.users", "op": "i" }));
        assert!(!matches_filter(&entry, &doc! { "ns": "app.orders" }));
        assert!(matches_filter(&entry, &Document::new()));
    }

    #[tokio::test]
    async fn test_cursor_sees_appended_entries() {
        let mock = MockUpstream::with_entries(vec![oplog_entry(1, 0, "a.b", "i")]);
        let mut cursor = mock
            .find(Namespace::oplog("oplog.rs"), Document::new(), CursorOptions::default())
            .await
            .unwrap();

        assert!(cursor.has_next().await.unwrap());
        cursor.next().await.unwrap();
        assert!(!cursor.has_next().await.unwrap());

        mock.append(vec![oplog_entry(2, 0, "a.b", "i")]);
        assert!(cursor.has_next().await.unwrap());
    }
}
