// src/sys/traits.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::sys::artifact::{Fingerprint, StagedArtifact};
use crate::sys::render::RenderedArtifact;
use crate::sys::secrets::CredentialRecord;

// ==============================================================================
// 1. Credential Store (Read-Only Snapshot)
// ==============================================================================

/// 🛡️ Read-only: the source runs inside a read-only transaction and hands secrets
/// back wrapped in `CredentialRecord`, never as plain strings.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Returns every role with a non-null secret that is neither named in `exclude`
    /// nor a direct member of a role named in `exclude`.
    /// Implementations must not mutate the store.
    async fn fetch(&self, exclude: &[String]) -> Result<Vec<CredentialRecord>>;
}

// ==============================================================================
// 2. Live Userlist (Change Detection + Atomic Publish)
// ==============================================================================

/// The live userlist and its neighbours (temp files, backups).
///
/// 🛡️ Every file an implementation creates holds secrets and must be owner-only.
/// The live file changes only through `promote`.
pub trait ArtifactStore: Send + Sync {
    fn live_path(&self) -> &Path;

    /// Writes the rendered content to a temp file on the live file's filesystem.
    fn stage(&self, artifact: &RenderedArtifact) -> Result<StagedArtifact>;

    /// Digest of the staged bytes, read back from disk.
    fn fingerprint_staged(&self, staged: &StagedArtifact) -> Result<Fingerprint>;

    /// `None` when there is no live file yet.
    fn fingerprint_live(&self) -> Result<Option<Fingerprint>>;

    /// Copies the live file aside. Must leave the live file untouched on failure.
    fn backup_live(&self, at: DateTime<Utc>) -> Result<PathBuf>;

    /// Atomically replaces the live file with `staged`. All-or-nothing.
    fn promote(&self, staged: StagedArtifact) -> Result<()>;
}

// ==============================================================================
// 3. Reload Signal
// ==============================================================================

/// 🛡️ Runs with the tool's privileges. Whatever it executes comes from the operator's
/// configuration, never from credential store contents.
#[async_trait]
pub trait ReloadAction: Send + Sync {
    /// Asks the pooler to re-read its auth file. Any non-success is an error.
    async fn reload(&self) -> Result<()>;
}
