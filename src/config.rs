//! Configuration for the single-instance subsystem.
//!
//! The lock-file path always comes from the embedding application (it owns
//! the per-user configuration directory); everything else has defaults that
//! match the wire-compatible behaviour of the protocol.

use std::path::{Path, PathBuf};

/// Configuration for an election attempt.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Path of the per-user lock file. Supplied by the embedding
    /// application.
    pub lock_path: PathBuf,

    /// Lowest port the leader may bind (inclusive).
    pub start_port: u16,

    /// Highest port the leader may bind (inclusive).
    pub end_port: u16,

    /// Random bind attempts before giving up on finding a port.
    pub bind_tries: u32,

    /// Outer election attempts before `setup` fails with
    /// [`InstanceError::LockUnavailable`](crate::error::InstanceError::LockUnavailable).
    pub election_tries: u32,
}

impl InstanceConfig {
    /// Create a configuration with the default port range and retry bounds.
    pub fn new<P: AsRef<Path>>(lock_path: P) -> Self {
        Self {
            lock_path: lock_path.as_ref().to_path_buf(),
            start_port: 4000,
            end_port: 10000,
            bind_tries: 10,
            election_tries: 2,
        }
    }

    /// Restrict the port range the leader may bind.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        assert!(start <= end, "port range start {} exceeds end {}", start, end);
        self.start_port = start;
        self.end_port = end;
        self
    }

    /// Override the number of random bind attempts.
    pub fn with_bind_tries(mut self, tries: u32) -> Self {
        self.bind_tries = tries;
        self
    }
}
