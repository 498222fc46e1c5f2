// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Log positions.
//!
//! Every oplog entry carries a `ts` field: a BSON timestamp made of the
//! seconds since the epoch and an ordinal that orders writes within the same
//! second. [`LogPosition`] is that pair, ordered lexicographically.
//!
//! # Position Semantics
//!
//! A position is used two ways:
//!
//! ```text
//! resume:      ts >  from              (start strictly after a seen entry)
//! diagnostics: ts <  (before + 1, 0)   (newest entry at or before a second)
//! ```
//!
//! The text form `seconds:ordinal` is what callers log and checkpoint.

use crate::error::{Result, TailerError};
use mongodb::bson::{Bson, Document, Timestamp};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Name of the position field on every oplog entry.
pub const POSITION_FIELD: &str = "ts";

/// Name of the namespace field on oplog entries.
pub const NAMESPACE_FIELD: &str = "ns";

/// A point in the replication log.
///
/// Field order matters: the derived `Ord` compares `seconds` first, then
/// `ordinal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    /// Ordinal of the write within `seconds`.
    pub ordinal: u32,
}

impl LogPosition {
    /// Create a position from its two components.
    pub const fn new(seconds: u32, ordinal: u32) -> Self {
        Self { seconds, ordinal }
    }

    /// Wall-clock instant of this position's second.
    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::from(self.seconds))
    }

    /// The BSON timestamp for this position.
    pub fn to_timestamp(self) -> Timestamp {
        Timestamp {
            time: self.seconds,
            increment: self.ordinal,
        }
    }
}

impl From<Timestamp> for LogPosition {
    fn from(ts: Timestamp) -> Self {
        Self::new(ts.time, ts.increment)
    }
}

impl From<LogPosition> for Timestamp {
    fn from(position: LogPosition) -> Self {
        position.to_timestamp()
    }
}

impl From<LogPosition> for Bson {
    fn from(position: LogPosition) -> Self {
        Bson::Timestamp(position.to_timestamp())
    }
}

impl TryFrom<&Bson> for LogPosition {
    type Error = TailerError;

    fn try_from(value: &Bson) -> Result<Self> {
        match value {
            Bson::Timestamp(ts) => Ok(Self::from(*ts)),
            other => Err(TailerError::InvalidPosition(format!(
                "expected a BSON timestamp, got {:?}",
                other.element_type()
            ))),
        }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds, self.ordinal)
    }
}

impl FromStr for LogPosition {
    type Err = TailerError;

    fn from_str(s: &str) -> Result<Self> {
        let (seconds, ordinal) = s
            .split_once(':')
            .ok_or_else(|| TailerError::InvalidPosition(format!("expected seconds:ordinal, got {:?}", s)))?;

        let seconds = seconds
            .trim()
            .parse()
            .map_err(|e| TailerError::InvalidPosition(format!("bad seconds in {:?}: {}", s, e)))?;
        let ordinal = ordinal
            .trim()
            .parse()
            .map_err(|e| TailerError::InvalidPosition(format!("bad ordinal in {:?}: {}", s, e)))?;

        Ok(Self::new(seconds, ordinal))
    }
}

/// Return the position of a record.
///
/// `None` when there is no record. A record whose `ts` is missing or is not a
/// timestamp also has no position.
pub fn position_of(record: Option<&Document>) -> Option<LogPosition> {
    match record?.get(POSITION_FIELD)? {
        Bson::Timestamp(ts) => Some(LogPosition::from(*ts)),
        _ => None,
    }
}

/// Return the wall-clock time of a record's position (second precision).
pub fn time_of(record: Option<&Document>) -> Option<SystemTime> {
    position_of(record).map(|p| p.time())
}

/// Return the namespace (`db.collection`) a record came from, if present.
pub fn namespace_of(record: &Document) -> Option<&str> {
    record.get_str(NAMESPACE_FIELD).ok()
}

/// Seconds since the epoch for a wall-clock time, clamped to the BSON
/// timestamp range.
pub(crate) fn epoch_seconds(time: SystemTime) -> u32 {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
