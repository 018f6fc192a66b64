//! Lock-file management for leader election.
//!
//! The lock file is both the mutual-exclusion primitive between process
//! invocations (exclusive create) and a tiny key-value store: the live
//! leader writes its listening port and session password into it as
//! `"<port>:<password>"` with no trailing newline, and every follower
//! reads that record to locate the leader.
//!
//! Exactly one live leader's record may be readable at a time. A stale
//! record (file exists but the content is malformed or names a dead
//! listener) is detected by the election loop in
//! [`executor`](crate::executor) and purged with [`LockFile::remove`].

use log::{error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{InstanceError, InstanceResult};

/// Most bytes ever read back out of a lock file.
const RECORD_READ_LIMIT: usize = 1000;

/// The `port:password` tuple persisted in the lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Port the leader is listening on, bound to localhost.
    pub port: u16,
    /// Session password followers must present on connect.
    pub password: String,
}

impl LockRecord {
    /// Serialize as `"<port>:<password>"`, no trailing newline.
    pub fn serialize(&self) -> String {
        format!("{}:{}", self.port, self.password)
    }

    /// Parse a record read back from the lock file.
    ///
    /// Splits on the first `:`; anything after it is the password, so a
    /// password may itself contain colons.
    pub fn parse(text: &str) -> InstanceResult<Self> {
        let (port, password) = text
            .split_once(':')
            .ok_or_else(|| InstanceError::MalformedRecord("missing ':' separator".to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| InstanceError::MalformedRecord(format!("invalid port {:?}: {}", port, e)))?;
        Ok(Self {
            port,
            password: password.to_string(),
        })
    }
}

/// Outcome of one lock-file acquisition attempt.
#[derive(Debug)]
pub enum LockState {
    /// This process created the file and is the leader; the handle is
    /// open for writing the [`LockRecord`].
    Acquired(File),
    /// Another process holds the file; the handle is open read-only for
    /// reading the leader's record.
    Existing(File),
}

/// Manager for the per-user lock file.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create a manager for the lock file at `path`. The path comes from
    /// the embedding application's per-user configuration layer.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The managed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock file currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Try to create the lock file exclusively; on "already exists" fall
    /// back to opening it read-only.
    ///
    /// If the file disappears between the two opens (a racing process
    /// removed a stale lock), the attempt restarts from the exclusive
    /// create. Any other OS failure is fatal and surfaces to the caller.
    pub fn acquire_or_read(&self) -> InstanceResult<LockState> {
        loop {
            let mut options = OpenOptions::new();
            options.read(true).write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }

            match options.open(&self.path) {
                Ok(file) => {
                    info!("acquired lock file {}", self.path.display());
                    return Ok(LockState::Acquired(file));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match File::open(&self.path) {
                        Ok(file) => return Ok(LockState::Existing(file)),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            // Lost a race with a process purging a stale
                            // lock; start over from the exclusive create.
                            warn!(
                                "lock file {} vanished mid-acquisition, retrying",
                                self.path.display()
                            );
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write the serialized record through an acquired handle.
    ///
    /// A single write call; a reader that observes the file while the
    /// write itself is interrupted may see a partial record. That window
    /// is accepted, not defended against.
    pub fn write_record(file: &mut File, record: &LockRecord) -> InstanceResult<()> {
        file.write_all(record.serialize().as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Read and parse the record through an existing handle, reading at
    /// most 1000 bytes.
    pub fn read_record(file: &mut File) -> InstanceResult<LockRecord> {
        let mut buf = vec![0u8; RECORD_READ_LIMIT];
        let n = file.read(&mut buf)?;
        let text = std::str::from_utf8(&buf[..n])
            .map_err(|e| InstanceError::MalformedRecord(format!("not valid UTF-8: {}", e)))?;
        LockRecord::parse(text)
    }

    /// Remove the lock file. Used when a stale or garbage record is
    /// detected; a concurrent removal by another process is not an error.
    pub fn remove(&self) -> InstanceResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed lock file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// A guard that removes the lock file when dropped. Held by the
    /// leader for best-effort cleanup on orderly shutdown.
    pub fn guard(&self) -> LockGuard {
        LockGuard {
            path: self.path.clone(),
        }
    }
}

/// Best-effort cleanup handle for the leader's lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("failed to clean up lock file {}: {}", self.path.display(), e);
            }
        }
    }
}
