// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upstream connection setup.
//!
//! Resolves the [`ConnectionMode`] into a live [`UpstreamConnection`] and
//! checks that the node we reached is one we are allowed to tail.
//!
//! # Connection Modes
//!
//! | Mode | Upstreams | Reads | Topology checks |
//! |------|-----------|-------|-----------------|
//! | `ReplicaSet` | 1+ seed addresses | secondary preferred | some member answers |
//! | `Secondary` | exactly 1 `host:port` | secondary ok | not primary, has `setName` |
//! | `DirectSlave` | exactly 1 `host:port` | secondary ok | has `setName` |
//! | `Existing` | exactly 1 live handle | as configured | none |
//!
//! `Secondary` exists to tail a known secondary. Reaching a primary there
//! is a [`TailerError::Topology`] rather than a silent fallback; use
//! `DirectSlave` to accept whichever node answers.
//!
//! The connection is opened once, at construction, and never replaced.
//! There is no reconnect: a dropped connection surfaces as an error on the
//! next operation.

use crate::driver::{OpenRequest, OpenTarget, OplogDriver, ReadMode, Upstream};
use crate::error::{Result, TailerError};
use crate::metrics;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host used when a host spec leaves the host empty.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when a host spec leaves the port empty.
pub const DEFAULT_PORT: u16 = 27017;

/// Default bound on a single round trip (one day).
///
/// Await-data fetches on a quiet oplog block for long stretches, so a normal
/// operation timeout would abort idle waits.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(86_400);

/// How the tailer reaches the cluster. Fixed for the tailer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// Replica-set-aware connection across seed addresses.
    #[serde(alias = "replset")]
    ReplicaSet,
    /// Direct connection to one node that must be a secondary.
    #[serde(alias = "slave")]
    Secondary,
    /// Direct connection to one node, primary or not.
    #[serde(alias = "direct")]
    DirectSlave,
    /// Wrap a connection handle the caller already owns.
    #[serde(alias = "pre-existing-handle")]
    Existing,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::ReplicaSet => "replica-set",
            ConnectionMode::Secondary => "secondary",
            ConnectionMode::DirectSlave => "direct-slave",
            ConnectionMode::Existing => "existing",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMode {
    type Err = TailerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replica-set" | "replset" => Ok(ConnectionMode::ReplicaSet),
            "secondary" | "slave" => Ok(ConnectionMode::Secondary),
            "direct-slave" | "direct" => Ok(ConnectionMode::DirectSlave),
            "existing" | "pre-existing-handle" => Ok(ConnectionMode::Existing),
            other => Err(TailerError::Config(format!(
                "Invalid connection type: {:?}",
                other
            ))),
        }
    }
}

/// A parsed `host:port` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub host: String,
    pub port: u16,
}

impl HostSpec {
    /// Parse `host:port`. Either half may be empty and falls back to
    /// [`DEFAULT_HOST`] / [`DEFAULT_PORT`].
    pub fn parse(spec: &str) -> Result<Self> {
        let (host, port) = match spec.split_once(':') {
            Some((host, port)) => (host.trim(), port.trim()),
            None => (spec.trim(), ""),
        };

        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let port = if port.is_empty() {
            DEFAULT_PORT
        } else {
            port.parse().map_err(|_| {
                TailerError::Config(format!("Invalid port in upstream {:?}", spec))
            })?
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One entry in the upstream list: an address to dial, or a live handle.
#[derive(Clone)]
pub enum UpstreamTarget {
    Address(String),
    Handle(Arc<dyn Upstream>),
}

impl fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamTarget::Address(addr) => f.debug_tuple("Address").field(addr).finish(),
            UpstreamTarget::Handle(handle) => f.debug_tuple("Handle").field(&handle.address()).finish(),
        }
    }
}

impl From<&str> for UpstreamTarget {
    fn from(addr: &str) -> Self {
        UpstreamTarget::Address(addr.to_string())
    }
}

impl From<String> for UpstreamTarget {
    fn from(addr: String) -> Self {
        UpstreamTarget::Address(addr)
    }
}

impl From<Arc<dyn Upstream>> for UpstreamTarget {
    fn from(handle: Arc<dyn Upstream>) -> Self {
        UpstreamTarget::Handle(handle)
    }
}

/// Options applied to every connection the tailer opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub op_timeout: Duration,
    pub app_name: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
            app_name: None,
        }
    }
}

/// A validated connection to the node or replica set being tailed.
#[derive(Clone)]
pub struct UpstreamConnection {
    upstream: Arc<dyn Upstream>,
    mode: ConnectionMode,
}

impl fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("address", &self.upstream.address())
            .field("mode", &self.mode)
            .finish()
    }
}

impl UpstreamConnection {
    fn new(upstream: Arc<dyn Upstream>, mode: ConnectionMode) -> Self {
        Self { upstream, mode }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn address(&self) -> String {
        self.upstream.address()
    }

    /// The underlying driver connection.
    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Ask the node who it is (`isMaster`). One round trip.
    pub async fn connection_config(&self) -> Result<Document> {
        self.upstream.admin_command(doc! { "isMaster": 1 }).await
    }

    /// Whether the node currently reports itself as primary.
    pub async fn is_primary(&self) -> Result<bool> {
        Ok(reports_primary(&self.connection_config().await?))
    }

    /// Fail with [`TailerError::Topology`] unless the node is a replica set member.
    pub async fn ensure_replica_set(&self) -> Result<()> {
        let config = self.connection_config().await?;
        check_replica_set(&self.address(), &config)
    }
}

/// Whether an `isMaster`/`hello` reply describes a writable primary.
pub fn reports_primary(config: &Document) -> bool {
    config.get_bool("ismaster").unwrap_or(false)
        || config.get_bool("isWritablePrimary").unwrap_or(false)
}

fn check_replica_set(address: &str, config: &Document) -> Result<()> {
    match config.get_str("setName") {
        Ok(name) if !name.is_empty() => Ok(()),
        _ => Err(TailerError::topology(
            address,
            format!("Server at {} is not running as a replica set", address),
        )),
    }
}

/// Treat a failed first command as "nothing reachable".
fn unreachable(target: &str, err: TailerError) -> TailerError {
    match err {
        TailerError::Driver { message, source, .. } => TailerError::Connection {
            target: target.to_string(),
            message,
            source,
        },
        other => other,
    }
}

/// Open and validate the upstream connection for `mode`.
pub async fn connect_upstream(
    driver: &dyn OplogDriver,
    targets: Vec<UpstreamTarget>,
    mode: ConnectionMode,
    options: &ConnectOptions,
) -> Result<UpstreamConnection> {
    let result = match mode {
        ConnectionMode::ReplicaSet => connect_replica_set(driver, targets, options).await,
        ConnectionMode::Secondary | ConnectionMode::DirectSlave => {
            connect_direct(driver, targets, mode, options).await
        }
        ConnectionMode::Existing => wrap_existing(targets),
    };

    metrics::record_upstream_connect(mode.as_str(), result.is_ok());
    result
}

async fn connect_replica_set(
    driver: &dyn OplogDriver,
    targets: Vec<UpstreamTarget>,
    options: &ConnectOptions,
) -> Result<UpstreamConnection> {
    let seeds = addresses(targets, ConnectionMode::ReplicaSet)?;
    if seeds.is_empty() {
        return Err(TailerError::Config(
            "Replica set mode needs at least one seed address".to_string(),
        ));
    }

    let target = OpenTarget::ReplicaSet { seeds };
    let target_str = target.to_string();
    info!(seeds = %target_str, "Connecting to replica set");

    let upstream = driver
        .open(OpenRequest {
            target,
            read: ReadMode::SecondaryPreferred,
            op_timeout: options.op_timeout,
            app_name: options.app_name.clone(),
        })
        .await?;
    let conn = UpstreamConnection::new(upstream, ConnectionMode::ReplicaSet);

    let config = conn
        .connection_config()
        .await
        .map_err(|e| unreachable(&target_str, e))?;

    info!(
        seeds = %target_str,
        set_name = config.get_str("setName").unwrap_or(""),
        "Connected to replica set"
    );
    Ok(conn)
}

async fn connect_direct(
    driver: &dyn OplogDriver,
    targets: Vec<UpstreamTarget>,
    mode: ConnectionMode,
    options: &ConnectOptions,
) -> Result<UpstreamConnection> {
    let host = parse_direct_upstream(targets, mode)?;
    let address = host.to_string();
    info!(address = %address, mode = %mode, "Connecting directly to node");

    let upstream = driver
        .open(OpenRequest {
            target: OpenTarget::Direct(host),
            read: ReadMode::SecondaryOk,
            op_timeout: options.op_timeout,
            app_name: options.app_name.clone(),
        })
        .await?;
    let conn = UpstreamConnection::new(upstream, mode);

    let config = conn
        .connection_config()
        .await
        .map_err(|e| unreachable(&address, e))?;

    if reports_primary(&config) {
        if mode == ConnectionMode::Secondary {
            return Err(TailerError::topology(
                &address,
                format!(
                    "Server at {} is the primary -- if you're ok with that, connect in direct-slave mode rather than secondary",
                    address
                ),
            ));
        }
        warn!(address = %address, "Tailing the primary directly");
    }

    check_replica_set(&address, &config)?;

    debug!(
        address = %address,
        set_name = config.get_str("setName").unwrap_or(""),
        "Upstream topology verified"
    );
    Ok(conn)
}

fn wrap_existing(mut targets: Vec<UpstreamTarget>) -> Result<UpstreamConnection> {
    match (targets.pop(), targets.is_empty()) {
        (Some(UpstreamTarget::Handle(handle)), true) => {
            info!(address = %handle.address(), "Using existing connection");
            Ok(UpstreamConnection::new(handle, ConnectionMode::Existing))
        }
        _ => Err(TailerError::Config(
            "Must pass in a single existing connection handle with existing mode".to_string(),
        )),
    }
}

fn addresses(targets: Vec<UpstreamTarget>, mode: ConnectionMode) -> Result<Vec<String>> {
    targets
        .into_iter()
        .map(|target| match target {
            UpstreamTarget::Address(addr) => Ok(addr),
            UpstreamTarget::Handle(handle) => Err(TailerError::Config(format!(
                "{} mode takes addresses, got an existing handle ({})",
                mode,
                handle.address()
            ))),
        })
        .collect()
}

fn parse_direct_upstream(targets: Vec<UpstreamTarget>, mode: ConnectionMode) -> Result<HostSpec> {
    let mut addrs = addresses(targets, mode)?;
    if addrs.len() != 1 {
        return Err(TailerError::Config(format!(
            "When connecting directly to a node, must provide a single upstream (got {})",
            addrs.len()
        )));
    }
    HostSpec::parse(&addrs.remove(0))
}
