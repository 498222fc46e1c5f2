// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the oplog tailer.
//!
//! Every error is surfaced synchronously by the operation that detects it.
//! The tailer never retries, reconnects or resumes on its own: resuming after
//! a failure is the caller's job, using the last [`LogPosition`](crate::LogPosition)
//! it processed.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Config` | No | Invalid mode, wrong upstream count, bad host spec |
//! | `Topology` | No | Node is a primary (secondary mode) or not in a replica set |
//! | `Connection` | Yes | No reachable member, driver failed to open |
//! | `AlreadyTailing` | No | `tail()` called while a cursor is open |
//! | `InvalidPosition` | No | Resume position is not a log timestamp |
//! | `Driver` | Yes | Command or cursor failure after connect |
//! | `InvalidState` | No | Operation attempted in the wrong tailer state |
//!
//! # Retry Behavior
//!
//! [`TailerError::is_retryable()`] is advisory. It tells a supervising caller
//! whether reconnecting and resuming from its last position is worth trying.

use thiserror::Error;

/// Result type alias for tailer operations.
pub type Result<T> = std::result::Result<T, TailerError>;

/// Errors that can occur while connecting to or tailing the oplog.
#[derive(Error, Debug)]
pub enum TailerError {
    /// Invalid or inconsistent configuration.
    ///
    /// Raised for unknown connection modes, the wrong number or kind of
    /// upstreams, and unparseable host specs. Always fatal.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream node has the wrong role for the requested mode.
    ///
    /// Raised at connect time when secondary mode reaches a primary, or when
    /// a directly connected node is not a replica set member.
    #[error("Topology error ({address}): {message}")]
    Topology { address: String, message: String },

    /// No upstream member could be reached.
    ///
    /// The driver error is kept as the source, unmodified.
    #[error("Connection error ({target}): {message}")]
    Connection {
        target: String,
        message: String,
        #[source]
        source: Option<mongodb::error::Error>,
    },

    /// `tail()` was called while a cursor is still open.
    ///
    /// Call `close()` before starting a new tail session.
    #[error("Already tailing the oplog")]
    AlreadyTailing,

    /// A resume position was not a log timestamp.
    ///
    /// This is a programmer error, not a runtime condition.
    #[error("Invalid log position: {0}")]
    InvalidPosition(String),

    /// A driver command or cursor operation failed after connecting.
    #[error("Driver error ({operation}): {message}")]
    Driver {
        operation: String,
        message: String,
        #[source]
        source: Option<mongodb::error::Error>,
    },

    /// Tailer state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl TailerError {
    /// Create a connection error from a driver error.
    pub fn connection(target: impl Into<String>, source: mongodb::error::Error) -> Self {
        Self::Connection {
            target: target.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a driver error from a driver error.
    pub fn driver(operation: impl Into<String>, source: mongodb::error::Error) -> Self {
        Self::Driver {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a driver error without source.
    pub fn driver_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a topology error.
    pub fn topology(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Topology {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Driver { .. } => true,
            Self::Config(_) => false,
            Self::Topology { .. } => false, // Pointing at the wrong node won't fix itself
            Self::AlreadyTailing => false,
            Self::InvalidPosition(_) => false,
            Self::InvalidState { .. } => false,
        }
    }
}
