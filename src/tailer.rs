// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Oplog tailer: the streaming engine.
//!
//! Owns the upstream connection and at most one tailable cursor over the
//! oplog, and hands records to a caller-supplied callback in log order.
//!
//! # State Transitions
//!
//! ```text
//!            tail()                 stream()
//!  Idle ───────────────→ Tailing ───────────────→ Streaming
//!    ↑                    │  ↑                        │
//!    │       close()      │  └────── (returns) ───────┘
//!    └────────────────────┘
//! ```
//!
//! `stop()` is a request, not a state: the current (or next) `stream()`
//! call ends at the next iteration boundary. The cursor stays open until
//! `close()`.
//!
//! # Delivery
//!
//! `stream()` is cooperative. Each iteration awaits the cursor (with
//! await-data this suspends until the upstream has data or the driver's wait
//! elapses), then calls the callback synchronously. Record N+1 is not fetched
//! until the callback for record N returns, and a callback in progress
//! always completes.
//!
//! To stop from inside the callback, take a [`StopHandle`] first:
//!
//! ```rust,no_run
//! # async fn example(tailer: &mut oplog_tailer::Tailer) -> oplog_tailer::Result<()> {
//! use oplog_tailer::{position_of, TailOptions};
//!
//! let start = tailer.most_recent_position(None).await?;
//! tailer.tail(TailOptions { from: start, ..Default::default() }).await?;
//!
//! let stop = tailer.stop_handle();
//! let mut last = start;
//! while tailer.tailing() {
//!     tailer
//!         .stream(Some(1000), |record| {
//!             last = position_of(Some(&record));
//!             if record.get_str("op") == Ok("c") {
//!                 stop.stop();
//!             }
//!         })
//!         .await?;
//! }
//! tailer.close().await;
//! # Ok(())
//! # }
//! ```

use crate::config::TailerConfig;
use crate::diagnostics;
use crate::driver::{CursorOptions, DriverOptions, Namespace, OplogCursor, OplogDriver, Upstream};
use crate::error::{Result, TailerError};
use crate::metrics;
use crate::mongo::MongoDriver;
use crate::position::{position_of, LogPosition};
use crate::query::{build_query, has_position_bound};
use crate::upstream::{connect_upstream, ConnectOptions, ConnectionMode, UpstreamConnection, UpstreamTarget};
use mongodb::bson::{Bson, Document};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, trace, warn};

/// Default oplog collection name in the `local` database.
pub const DEFAULT_OPLOG: &str = "oplog.rs";

/// Observable state of a [`Tailer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// No cursor open.
    Idle,
    /// Cursor open, not delivering.
    Tailing,
    /// Inside `stream()`, delivering records.
    Streaming,
}

impl fmt::Display for TailerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TailerState::Idle => write!(f, "Idle"),
            TailerState::Tailing => write!(f, "Tailing"),
            TailerState::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Options for [`Tailer::tail`].
#[derive(Debug, Clone, Default)]
pub struct TailOptions {
    /// Start strictly after this position. `None` scans from the start.
    pub from: Option<LogPosition>,
    /// Extra predicate on oplog entries.
    pub filter: Option<Document>,
    /// Only entries for this namespace (applies with `from`).
    pub namespace: Option<Namespace>,
    /// Don't block waiting for new data at the end of the oplog.
    pub dont_wait: bool,
    /// Cursor overrides passed to the driver.
    pub driver: DriverOptions,
}

impl TailOptions {
    pub fn from_position(position: LogPosition) -> Self {
        Self {
            from: Some(position),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_namespace(mut self, db: impl Into<String>, collection: impl Into<String>) -> Self {
        self.namespace = Some(Namespace::new(db, collection));
        self
    }

    pub fn dont_wait(mut self) -> Self {
        self.dont_wait = true;
        self
    }
}

/// Cooperative stop request shared with callbacks and other tasks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request that streaming end at the next iteration boundary. Idempotent.
    pub fn stop(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            metrics::record_stop_requested();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Session {
    Idle,
    Open {
        cursor: Box<dyn OplogCursor>,
        from: Option<LogPosition>,
        streaming: bool,
    },
}

/// Follows the oplog of one upstream and streams its records.
pub struct Tailer {
    upstream: UpstreamConnection,
    oplog: Namespace,
    session: Session,
    stop: StopHandle,
}

impl fmt::Debug for Tailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tailer")
            .field("upstream", &self.upstream)
            .field("oplog", &self.oplog)
            .field("state", &self.state())
            .field("stop_requested", &self.stop.is_stop_requested())
            .finish()
    }
}

impl Tailer {
    /// Connect with the MongoDB driver using a loaded config.
    pub async fn connect(config: &TailerConfig) -> Result<Self> {
        config.validate()?;
        Self::connect_with(
            &MongoDriver::new(),
            config.targets(),
            config.mode,
            &config.connect_options(),
            &config.oplog,
        )
        .await
    }

    /// Connect through any driver.
    pub async fn connect_with(
        driver: &dyn OplogDriver,
        targets: Vec<UpstreamTarget>,
        mode: ConnectionMode,
        options: &ConnectOptions,
        oplog: &str,
    ) -> Result<Self> {
        let upstream = connect_upstream(driver, targets, mode, options).await?;
        Ok(Self::from_connection(upstream, oplog))
    }

    /// Wrap a connection handle the caller already owns.
    pub async fn from_existing(handle: Arc<dyn Upstream>, oplog: &str) -> Result<Self> {
        let upstream = connect_upstream(
            &NoDriver,
            vec![UpstreamTarget::Handle(handle)],
            ConnectionMode::Existing,
            &ConnectOptions::default(),
        )
        .await?;
        Ok(Self::from_connection(upstream, oplog))
    }

    /// Build a tailer over an already validated connection.
    pub fn from_connection(upstream: UpstreamConnection, oplog: &str) -> Self {
        let oplog = Namespace::oplog(oplog);
        metrics::set_tailer_state(&oplog.to_string(), TailerState::Idle);
        Self {
            upstream,
            oplog,
            session: Session::Idle,
            stop: StopHandle::default(),
        }
    }

    pub fn upstream(&self) -> &UpstreamConnection {
        &self.upstream
    }

    /// The oplog namespace being tailed (e.g. `local.oplog.rs`).
    pub fn oplog(&self) -> &Namespace {
        &self.oplog
    }

    pub fn state(&self) -> TailerState {
        match self.session {
            Session::Idle => TailerState::Idle,
            Session::Open { streaming: false, .. } => TailerState::Tailing,
            Session::Open { streaming: true, .. } => TailerState::Streaming,
        }
    }

    /// Where the open session started from, if a cursor is open.
    pub fn started_from(&self) -> Option<LogPosition> {
        match self.session {
            Session::Open { from, .. } => from,
            Session::Idle => None,
        }
    }

    /// Newest oplog entry, or the newest at or before `before_time`.
    pub async fn latest_oplog_entry(&self, before_time: Option<SystemTime>) -> Result<Option<Document>> {
        diagnostics::latest_oplog_entry(self.upstream.upstream().as_ref(), &self.oplog, before_time).await
    }

    /// Position of the newest oplog entry (at or before `before_time`).
    ///
    /// Pass the result to [`tail`](Self::tail) to start right after it.
    pub async fn most_recent_position(&self, before_time: Option<SystemTime>) -> Result<Option<LogPosition>> {
        let entry = self.latest_oplog_entry(before_time).await?;
        Ok(position_of(entry.as_ref()))
    }

    /// Open a tailable cursor over the oplog.
    pub async fn tail(&mut self, options: TailOptions) -> Result<()> {
        if matches!(self.session, Session::Open { .. }) {
            return Err(TailerError::AlreadyTailing);
        }

        if options.namespace.is_some() && options.from.is_none() {
            warn!(oplog = %self.oplog, "Namespace filter only applies with a start position, ignoring it");
        }

        let from = options.from.map(Bson::from);
        let query = build_query(from.as_ref(), options.filter, options.namespace.as_ref())?;

        let mut cursor_options = CursorOptions {
            tailable: true,
            await_data: !options.dont_wait,
            oplog_replay: has_position_bound(&query),
            ..Default::default()
        };
        options.driver.apply(&mut cursor_options);

        debug!(oplog = %self.oplog, query = %query, options = ?cursor_options, "Opening oplog cursor");
        let cursor = self
            .upstream
            .upstream()
            .find(self.oplog.clone(), query, cursor_options)
            .await
            .inspect_err(|e| metrics::record_error("tail", error_type(e)))?;

        match options.from {
            Some(position) => debug!(oplog = %self.oplog, from = %position, "Starting oplog stream"),
            None => debug!(oplog = %self.oplog, from = "start", "Starting oplog stream"),
        }

        self.session = Session::Open {
            cursor,
            from: options.from,
            streaming: false,
        };
        let oplog = self.oplog.to_string();
        metrics::record_tail_started(&oplog, options.from.is_some());
        metrics::set_tailer_state(&oplog, TailerState::Tailing);
        Ok(())
    }

    /// Shorthand for `tail` starting after `position`.
    pub async fn tail_from(&mut self, position: LogPosition, options: TailOptions) -> Result<()> {
        self.tail(TailOptions {
            from: Some(position),
            ..options
        })
        .await
    }

    /// Deliver records to `callback` until stopped, out of data, or `limit`
    /// records have been delivered.
    ///
    /// Returns whether the cursor still reports data available, so the
    /// caller can decide whether to call `stream` again.
    pub async fn stream<F>(&mut self, limit: Option<usize>, mut callback: F) -> Result<bool>
    where
        F: FnMut(Document),
    {
        let oplog = self.oplog.to_string();
        let stop = self.stop.clone();

        let Session::Open { cursor, streaming, .. } = &mut self.session else {
            return Err(TailerError::InvalidState {
                expected: TailerState::Tailing.to_string(),
                actual: TailerState::Idle.to_string(),
            });
        };

        *streaming = true;
        metrics::set_tailer_state(&oplog, TailerState::Streaming);

        let started = Instant::now();
        let mut progress = Progress::default();
        let outcome = deliver(cursor.as_mut(), &stop, limit, &mut progress, &mut callback).await;

        *streaming = false;
        metrics::set_tailer_state(&oplog, TailerState::Tailing);
        metrics::record_stream_call(&oplog, progress.delivered, started.elapsed());
        if let Some(position) = progress.last {
            metrics::set_last_position(&oplog, position.seconds);
        }

        trace!(
            oplog = %oplog,
            delivered = progress.delivered,
            last = ?progress.last,
            stop_requested = stop.is_stop_requested(),
            "Stream loop exited"
        );

        let more = match outcome {
            Ok(()) => cursor.has_next().await,
            Err(e) => Err(e),
        };
        more.inspect_err(|e| metrics::record_error("stream", error_type(e)))
    }

    /// Request that streaming stop at the next iteration boundary.
    ///
    /// Doesn't close the cursor and doesn't block.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A clonable handle that can request a stop from inside a callback.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stop_requested()
    }

    /// Whether tailing activity is outstanding: no stop requested, or a
    /// `stream` call still running.
    pub fn tailing(&self) -> bool {
        !self.stop.is_stop_requested() || self.state() == TailerState::Streaming
    }

    /// Close the cursor (if any), clear the stop request, and return to `Idle`.
    pub async fn close(&mut self) {
        if let Session::Open { mut cursor, .. } = std::mem::replace(&mut self.session, Session::Idle) {
            if let Err(e) = cursor.close().await {
                warn!(oplog = %self.oplog, error = %e, "Failed to close oplog cursor");
            } else {
                debug!(oplog = %self.oplog, "Closed oplog cursor");
            }
        }
        self.stop.reset();
        metrics::set_tailer_state(&self.oplog.to_string(), TailerState::Idle);
    }
}

#[derive(Debug, Default)]
struct Progress {
    delivered: usize,
    last: Option<LogPosition>,
}

async fn deliver<F>(
    cursor: &mut dyn OplogCursor,
    stop: &StopHandle,
    limit: Option<usize>,
    progress: &mut Progress,
    callback: &mut F,
) -> Result<()>
where
    F: FnMut(Document),
{
    while !stop.is_stop_requested() {
        if limit.is_some_and(|limit| progress.delivered >= limit) {
            break;
        }
        if !cursor.has_next().await? {
            break;
        }

        let record = cursor.next().await?;
        if let Some(position) = position_of(Some(&record)) {
            trace!(position = %position, "Delivering oplog record");
            progress.last = Some(position);
        }

        callback(record);
        progress.delivered += 1;
    }
    Ok(())
}

fn error_type(e: &TailerError) -> &'static str {
    match e {
        TailerError::Config(_) => "config",
        TailerError::Topology { .. } => "topology",
        TailerError::Connection { .. } => "connection",
        TailerError::AlreadyTailing => "already_tailing",
        TailerError::InvalidPosition(_) => "invalid_position",
        TailerError::Driver { .. } => "driver",
        TailerError::InvalidState { .. } => "invalid_state",
    }
}

/// Placeholder driver for existing mode, which never opens a connection.
struct NoDriver;

impl OplogDriver for NoDriver {
    fn open(&self, request: crate::driver::OpenRequest) -> crate::driver::BoxFuture<'_, Arc<dyn Upstream>> {
        Box::pin(async move {
            Err(TailerError::Config(format!(
                "Existing mode cannot open a new connection to {}",
                request.target
            )))
        })
    }
}
