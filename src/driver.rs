// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Driver integration traits.
//!
//! The tailer does not speak the wire protocol itself. It consumes three
//! capabilities from a database driver:
//!
//! - [`OplogDriver`]: open a connection to one node or a replica set
//! - [`Upstream`]: run admin commands and queries on that connection
//! - [`OplogCursor`]: iterate a (possibly tailable) query result
//!
//! [`crate::mongo::MongoDriver`] implements them on top of the `mongodb`
//! crate. Tests plug in an in-memory oplog instead.
//!
//! # Example
//!
//! ```rust,no_run
//! use oplog_tailer::driver::{BoxFuture, CursorOptions, Namespace, OplogCursor, Upstream};
//! use mongodb::bson::{doc, Document};
//!
//! struct EmptyLog;
//!
//! impl Upstream for EmptyLog {
//!     fn address(&self) -> String {
//!         "memory".to_string()
//!     }
//!
//!     fn admin_command(&self, _command: Document) -> BoxFuture<'_, Document> {
//!         Box::pin(async { Ok(doc! { "ismaster": false, "setName": "rs0" }) })
//!     }
//!
//!     fn find_one(&self, _ns: Namespace, _filter: Document, _sort: Document) -> BoxFuture<'_, Option<Document>> {
//!         Box::pin(async { Ok(None) })
//!     }
//!
//!     fn find(&self, _ns: Namespace, _filter: Document, _options: CursorOptions) -> BoxFuture<'_, Box<dyn OplogCursor>> {
//!         unimplemented!()
//!     }
//! }
//! ```

use crate::error::Result;
use crate::upstream::HostSpec;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for boxed async futures (keeps trait signatures readable).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A `(database, collection)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
        }
    }

    /// The oplog collection in the `local` database.
    pub fn oplog(collection: impl Into<String>) -> Self {
        Self::new("local", collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Which members a connection may read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Replica set connection, route reads to secondaries when available.
    SecondaryPreferred,
    /// Direct connection, reading from a non-primary node is allowed.
    SecondaryOk,
}

/// What to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    /// Discover the replica set from these seed addresses.
    ReplicaSet { seeds: Vec<String> },
    /// Talk to exactly this node, no discovery.
    Direct(HostSpec),
}

impl fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenTarget::ReplicaSet { seeds } => write!(f, "{}", seeds.join(",")),
            OpenTarget::Direct(host) => write!(f, "{}", host),
        }
    }
}

/// A request to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub target: OpenTarget,
    pub read: ReadMode,
    /// Upper bound on any single round trip.
    pub op_timeout: Duration,
    pub app_name: Option<String>,
}

/// Flags for opening a cursor over the oplog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorOptions {
    /// Keep the cursor open at the end of the data.
    pub tailable: bool,
    /// Block on fetch for a bounded interval waiting for new data.
    pub await_data: bool,
    /// Hint that the query scans the oplog from a `ts` bound.
    pub oplog_replay: bool,
    /// Disable the server's idle cursor timeout.
    pub no_cursor_timeout: bool,
    pub batch_size: Option<u32>,
    /// Server-side wait for an await-data fetch.
    pub max_await_time: Option<Duration>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            tailable: false,
            await_data: false,
            oplog_replay: false,
            no_cursor_timeout: true,
            batch_size: None,
            max_await_time: None,
        }
    }
}

/// Caller overrides for cursor options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    pub no_cursor_timeout: Option<bool>,
    pub batch_size: Option<u32>,
    pub max_await_time: Option<Duration>,
}

impl DriverOptions {
    /// Merge these overrides into `options`.
    pub fn apply(&self, options: &mut CursorOptions) {
        if let Some(no_timeout) = self.no_cursor_timeout {
            options.no_cursor_timeout = no_timeout;
        }
        if self.batch_size.is_some() {
            options.batch_size = self.batch_size;
        }
        if self.max_await_time.is_some() {
            options.max_await_time = self.max_await_time;
        }
    }
}

/// Opens connections.
pub trait OplogDriver: Send + Sync {
    /// Open a connection. Fails with [`TailerError::Connection`](crate::TailerError::Connection)
    /// when no member is reachable.
    fn open(&self, request: OpenRequest) -> BoxFuture<'_, Arc<dyn Upstream>>;
}

/// A live connection to a node or replica set.
pub trait Upstream: Send + Sync {
    /// Human-readable address for logs and errors (e.g. `db1:27017`).
    fn address(&self) -> String;

    /// Run a command against the `admin` database.
    fn admin_command(&self, command: Document) -> BoxFuture<'_, Document>;

    /// Return the first document matching `filter` in `sort` order.
    fn find_one(
        &self,
        ns: Namespace,
        filter: Document,
        sort: Document,
    ) -> BoxFuture<'_, Option<Document>>;

    /// Open a cursor over `ns`.
    fn find(
        &self,
        ns: Namespace,
        filter: Document,
        options: CursorOptions,
    ) -> BoxFuture<'_, Box<dyn OplogCursor>>;
}

/// A cursor over query results.
pub trait OplogCursor: Send {
    /// Whether a record is available.
    ///
    /// For await-data cursors this suspends until data arrives or the
    /// driver's await interval elapses.
    fn has_next(&mut self) -> BoxFuture<'_, bool>;

    /// Return the next record.
    fn next(&mut self) -> BoxFuture<'_, Document>;

    /// Release the cursor on the server.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}
