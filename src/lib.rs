//! # Oplog Tailer
//!
//! Follows the replication log ("oplog") of a MongoDB replica set and hands
//! its entries to a callback as an ordered, resumable stream of change
//! records, for change-data-capture pipelines.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                              oplog-tailer                             │
//! │                                                                       │
//! │  ┌──────────────────┐    ┌──────────────┐    ┌──────────────────────┐ │
//! │  │ Upstream         │───►│ Tailer       │───►│ callback(record)     │ │
//! │  │ (mode + topology │    │ (tailable    │    │ (caller checkpoints  │ │
//! │  │  checks)         │    │  cursor)     │    │  position_of(record))│ │
//! │  └──────────────────┘    └──────────────┘    └──────────────────────┘ │
//! │           │                     ▲                                     │
//! │           ▼                     │ build_query(from, filter, ns)       │
//! │  ┌──────────────────┐    ┌──────────────┐                             │
//! │  │ OplogDriver      │    │ Diagnostics  │  most_recent_position()     │
//! │  │ (mongodb crate)  │    │ (latest ts)  │                             │
//! │  └──────────────────┘    └──────────────┘                             │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tailer is single-actor and cooperative: `stream()` suspends at each
//! cursor fetch, and there are no background tasks. It never retries or
//! reconnects; resume by building a new tailer and passing the last
//! position you processed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use oplog_tailer::{ConnectionMode, TailOptions, Tailer, TailerConfig};
//!
//! #[tokio::main]
//! async fn main() -> oplog_tailer::Result<()> {
//!     let config = TailerConfig::for_testing("db2.internal:27017", ConnectionMode::Secondary);
//!     let mut tailer = Tailer::connect(&config).await?;
//!
//!     let from = tailer.most_recent_position(None).await?;
//!     tailer.tail(TailOptions { from, ..Default::default() }).await?;
//!
//!     while tailer.tailing() {
//!         tailer
//!             .stream(None, |record| println!("{}", record))
//!             .await?;
//!     }
//!
//!     tailer.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod mongo;
pub mod position;
pub mod query;
pub mod tailer;
pub mod upstream;

// Re-exports for convenience
pub use config::TailerConfig;
pub use driver::{CursorOptions, DriverOptions, Namespace, OplogCursor, OplogDriver, Upstream};
pub use error::{Result, TailerError};
pub use mongo::{MongoDriver, MongoUpstream};
pub use position::{namespace_of, position_of, time_of, LogPosition};
pub use query::build_query;
pub use tailer::{StopHandle, TailOptions, Tailer, TailerState};
pub use upstream::{connect_upstream, ConnectOptions, ConnectionMode, HostSpec, UpstreamConnection, UpstreamTarget};
