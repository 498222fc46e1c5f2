//! Configuration for the oplog tailer.
//!
//! [`TailerConfig`] is what a host process loads (YAML/JSON via serde) and
//! hands to [`Tailer::connect()`](crate::Tailer::connect). Loading the file is
//! the host's concern; this module only defines the shape and defaults.
//!
//! # Quick Start
//!
//! ```rust
//! use oplog_tailer::config::TailerConfig;
//! use oplog_tailer::ConnectionMode;
//!
//! let config = TailerConfig {
//!     upstreams: vec!["db1:27017".into(), "db2:27017".into()],
//!     mode: ConnectionMode::ReplicaSet,
//!     ..Default::default()
//! };
//! assert_eq!(config.oplog, "oplog.rs");
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! upstreams:
//!   - "db2.internal:27017"
//! mode: secondary
//! oplog: "oplog.rs"
//! op_timeout: "24h"
//! app_name: "cdc-pipeline"
//! ```

use crate::error::{Result, TailerError};
use crate::tailer::DEFAULT_OPLOG;
use crate::upstream::{ConnectOptions, ConnectionMode, UpstreamTarget, DEFAULT_OP_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level tailer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailerConfig {
    /// Upstream addresses (`host:port`). Seeds in replica set mode, exactly
    /// one node in secondary/direct-slave mode.
    pub upstreams: Vec<String>,

    /// How to reach the cluster.
    #[serde(default = "default_mode")]
    pub mode: ConnectionMode,

    /// Oplog collection name in the `local` database.
    #[serde(default = "default_oplog")]
    pub oplog: String,

    /// Bound on a single driver round trip, as a duration string ("24h").
    /// Kept huge because await-data fetches block on a quiet oplog.
    #[serde(default = "default_op_timeout")]
    pub op_timeout: String,

    /// Client application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_mode() -> ConnectionMode {
    ConnectionMode::ReplicaSet
}

fn default_oplog() -> String {
    DEFAULT_OPLOG.to_string()
}

fn default_op_timeout() -> String {
    "24h".to_string()
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            upstreams: Vec::new(),
            mode: default_mode(),
            oplog: default_oplog(),
            op_timeout: default_op_timeout(),
            app_name: None,
        }
    }
}

impl TailerConfig {
    /// Create a minimal config for testing against a single node.
    pub fn for_testing(upstream: &str, mode: ConnectionMode) -> Self {
        Self {
            upstreams: vec![upstream.to_string()],
            mode,
            ..Default::default()
        }
    }

    /// Parse the op_timeout string to a Duration.
    ///
    /// Falls back to one day on an unparseable value.
    pub fn op_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.op_timeout).unwrap_or(DEFAULT_OP_TIMEOUT)
    }

    /// Options for the upstream connector.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            op_timeout: self.op_timeout_duration(),
            app_name: self.app_name.clone(),
        }
    }

    /// Upstream addresses as connector targets.
    pub fn targets(&self) -> Vec<UpstreamTarget> {
        self.upstreams.iter().cloned().map(UpstreamTarget::Address).collect()
    }

    /// Reject configs that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.oplog.trim().is_empty() {
            return Err(TailerError::Config("oplog collection name is empty".to_string()));
        }
        if self.mode == ConnectionMode::Existing {
            return Err(TailerError::Config(
                "existing mode needs a live handle; use Tailer::from_existing".to_string(),
            ));
        }
        if humantime::parse_duration(&self.op_timeout).is_err() {
            return Err(TailerError::Config(format!(
                "invalid op_timeout {:?}",
                self.op_timeout
            )));
        }
        Ok(())
    }
}
