// src/pipeline.rs

use std::path::PathBuf;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::sys::artifact::{FsArtifactStore, StagedArtifact};
use crate::sys::lock::RunLock;
use crate::sys::postgres::PostgresCredentialSource;
use crate::sys::reload::{ReloadMarker, ShellReloadAction};
use crate::sys::render::render;
use crate::sys::secrets::CredentialSet;
use crate::sys::traits::{ArtifactStore, CredentialSource, ReloadAction};

/// What a successful run did. Failures are always `Err`, never a partial outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The live userlist was replaced.
    pub changed: bool,
    /// Copy of the previous userlist, when there was one to keep.
    pub backup: Option<PathBuf>,
    /// The reload command ran (and succeeded).
    pub reloaded: bool,
}

pub struct SyncPipeline {
    config: SyncConfig,
    source: Box<dyn CredentialSource>,
    store: Box<dyn ArtifactStore>,
    reloader: Box<dyn ReloadAction>,
    marker: ReloadMarker,
}

impl SyncPipeline {
    /// Production wiring: PostgreSQL catalog, local filesystem, shell reload.
    pub fn new(config: SyncConfig) -> Self {
        let source = PostgresCredentialSource::new(&config.database_url, config.timeout);
        let store = FsArtifactStore::new(config.userlist_path.clone());
        let reloader = ShellReloadAction::new(config.reload_command.clone());
        Self::with_parts(config, Box::new(source), Box::new(store), Box::new(reloader))
    }

    pub fn with_parts(
        config: SyncConfig,
        source: Box<dyn CredentialSource>,
        store: Box<dyn ArtifactStore>,
        reloader: Box<dyn ReloadAction>,
    ) -> Self {
        Self {
            marker: ReloadMarker::new(config.reload_marker.clone()),
            config,
            source,
            store,
            reloader,
        }
    }

    /// One full pass: fetch → render → compare → (backup → publish → mark) → reload check.
    #[instrument(skip(self), fields(userlist = %self.store.live_path().display()))]
    pub async fn run(&self) -> Result<RunOutcome> {
        // 🛡️ Nothing on disk is touched (not even the lock file) until the fetch has
        // fully succeeded and the result is known to be renderable.
        let records = timeout(self.config.timeout, self.source.fetch(&self.config.exclude))
            .await
            .map_err(|_| SyncError::Timeout(self.config.timeout))??;
        let set = CredentialSet::new(records);
        set.check_renderable()?;
        if set.is_empty() {
            warn!("Credential store returned no roles, userlist will be empty");
        }
        debug!(roles = set.len(), "Rendering userlist");

        let artifact = render(&set);
        drop(set);

        // Serialises stage → backup → promote → marker against other runs on the same userlist.
        let _lock = RunLock::acquire(&self.config.lock_path())?;

        let staged = self.store.stage(&artifact)?;
        drop(artifact);

        let new_fp = self.store.fingerprint_staged(&staged)?;
        let live_fp = self.store.fingerprint_live()?;
        let changed = match live_fp {
            Some(old) if old == new_fp => {
                info!(fingerprint = %new_fp, "Userlist has no changes, skipping update");
                false
            }
            Some(old) => {
                info!(old = %old, new = %new_fp, "Userlist content changed");
                true
            }
            None => {
                info!(new = %new_fp, "No live userlist yet, publishing first version");
                true
            }
        };

        let mut outcome = RunOutcome::default();
        if changed {
            outcome.backup = self.publish(staged, live_fp.is_some())?;
            outcome.changed = true;
            self.marker.mark_owed()?;
        } else {
            drop(staged);
        }

        if self.marker.is_owed()? {
            info!(marker = %self.marker.path().display(), "Reload owed, running reload command");
            self.reloader.reload().await?;
            outcome.reloaded = true;
        }

        Ok(outcome)
    }

    fn publish(&self, staged: StagedArtifact, has_live: bool) -> Result<Option<PathBuf>> {
        // Backup strictly before the rename; a failed backup drops `staged` and leaves the live file alone.
        let backup = if has_live {
            Some(self.store.backup_live(Utc::now())?)
        } else {
            None
        };

        if let Err(e) = self.store.promote(staged) {
            if let Some(path) = &backup {
                warn!(backup = %path.display(), "Publish failed after backup; live userlist left as it was");
            }
            return Err(e);
        }

        match &backup {
            Some(path) => info!(backup = %path.display(), "Published new userlist"),
            None => info!("Published new userlist"),
        }
        Ok(backup)
    }
}
