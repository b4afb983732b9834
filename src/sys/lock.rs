// src/sys/lock.rs

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{Result, SyncError};

/// Exclusive advisory lock held for the whole run. Released when dropped.
///
/// Only cooperating runs of this tool honour it; the pooler never takes it.
pub struct RunLock {
    _guard: Flock<File>,
}

impl RunLock {
    /// Fails fast with `SyncError::Locked` when another run holds the lock.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(|source| SyncError::Locked {
                path: path.to_path_buf(),
                source,
            })?;

        let guard = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            SyncError::Locked {
                path: path.to_path_buf(),
                source: io::Error::from(errno),
            }
        })?;

        debug!(lock = %path.display(), "Acquired run lock");
        Ok(Self { _guard: guard })
    }
}
