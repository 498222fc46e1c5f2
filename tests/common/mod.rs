//! Shared test utilities for the tailer, chaos and integration tests.
//!
//! This module provides:
//! - MongoDB testcontainer setup
//! - In-memory oplog (`MockUpstream`) and driver (`MockDriver`)
//! - Oplog entry helpers

pub mod containers;
pub mod mock_upstream;

#[allow(unused_imports)]
pub use containers::*;
#[allow(unused_imports)]
pub use mock_upstream::*;
