// src/sys/artifact.rs

use std::fmt;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::sys::render::RenderedArtifact;
use crate::sys::traits::ArtifactStore;

/// SHA-256 of a file's bytes. Used for change detection only, not as a security boundary.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Streams `path` through the hasher without loading it whole.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// Rendered content sitting in a temp file beside the live userlist.
///
/// Dropping it without `ArtifactStore::promote` deletes the temp file, so every
/// early return after staging cleans up on its own.
pub struct StagedArtifact {
    file: NamedTempFile,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl fmt::Debug for StagedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedArtifact").field("path", &self.path()).finish()
    }
}

/// `<live>.backup-<unix seconds>`
pub fn backup_path(live: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut name = live.as_os_str().to_owned();
    name.push(format!(".backup-{}", at.timestamp()));
    PathBuf::from(name)
}

// ==============================================================================
// Concrete Implementation (Local Filesystem)
// ==============================================================================

pub struct FsArtifactStore {
    live: PathBuf,
}

impl FsArtifactStore {
    pub fn new(live: PathBuf) -> Self {
        Self { live }
    }

    fn parent_dir(&self) -> &Path {
        match self.live.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn temp_write_err(&self, source: io::Error) -> SyncError {
        SyncError::TempWrite {
            path: self.live.clone(),
            source,
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn live_path(&self) -> &Path {
        &self.live
    }

    fn stage(&self, artifact: &RenderedArtifact) -> Result<StagedArtifact> {
        let prefix = match self.live.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".userlist.".to_string(),
        };

        // Same directory as the live file: the later rename never crosses a filesystem.
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(self.parent_dir())
            .map_err(|e| self.temp_write_err(e))?;

        // 🛡️ Owner-only before the first byte lands: the temp file holds every hash.
        file.as_file()
            .set_permissions(Permissions::from_mode(0o600))
            .map_err(|e| self.temp_write_err(e))?;
        file.write_all(artifact.as_bytes())
            .map_err(|e| self.temp_write_err(e))?;
        file.as_file().sync_all().map_err(|e| self.temp_write_err(e))?;

        debug!(temp = %file.path().display(), bytes = artifact.len(), "Staged rendered userlist");
        Ok(StagedArtifact { file })
    }

    fn fingerprint_staged(&self, staged: &StagedArtifact) -> Result<Fingerprint> {
        Fingerprint::of_file(staged.path()).map_err(|source| SyncError::Fingerprint {
            path: staged.path().to_path_buf(),
            source,
        })
    }

    fn fingerprint_live(&self) -> Result<Option<Fingerprint>> {
        match Fingerprint::of_file(&self.live) {
            Ok(fp) => Ok(Some(fp)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SyncError::Fingerprint {
                path: self.live.clone(),
                source,
            }),
        }
    }

    fn backup_live(&self, at: DateTime<Utc>) -> Result<PathBuf> {
        let backup = backup_path(&self.live, at);
        let backup_err = |source: io::Error| SyncError::Backup {
            path: self.live.clone(),
            backup: backup.clone(),
            source,
        };

        let mut src = File::open(&self.live).map_err(backup_err)?;
        // 🛡️ create_new + 0600: an existing backup from the same second is never
        // clobbered, and the copy is never readable beyond the owner.
        let mut dst = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&backup)
            .map_err(backup_err)?;

        let copied = io::copy(&mut src, &mut dst).and_then(|n| dst.sync_all().map(|_| n));
        match copied {
            Ok(bytes) => {
                debug!(backup = %backup.display(), bytes, "Backed up live userlist");
                Ok(backup.clone())
            }
            Err(source) => {
                // Half-written backups must not linger as if they were valid history.
                drop(dst);
                let _ = fs::remove_file(&backup);
                Err(backup_err(source))
            }
        }
    }

    fn promote(&self, staged: StagedArtifact) -> Result<()> {
        // 🛡️ Atomic Publish: rename(2) swaps the directory entry in one step, so the
        // pooler reads the old file or the new one, never a partial write.
        staged
            .file
            .persist(&self.live)
            .map_err(|e| SyncError::Publish {
                path: self.live.clone(),
                source: e.error,
            })?;

        if let Err(e) = File::open(self.parent_dir()).and_then(|dir| dir.sync_all()) {
            warn!(dir = %self.parent_dir().display(), error = %e, "Directory fsync after publish failed");
        }
        Ok(())
    }
}
