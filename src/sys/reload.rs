// src/sys/reload.rs

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DATABASE_URL_VAR;
use crate::error::{Result, SyncError};
use crate::sys::traits::ReloadAction;

/// Zero-length sentinel whose existence means a reload is owed.
#[derive(Debug, Clone)]
pub struct ReloadMarker {
    path: PathBuf,
}

impl ReloadMarker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotent: an existing marker is left as is.
    pub fn mark_owed(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&self.path)
            .map_err(|source| self.marker_err(source))?;
        debug!(marker = %self.path.display(), "Reload marked as owed");
        Ok(())
    }

    pub fn is_owed(&self) -> Result<bool> {
        self.path.try_exists().map_err(|source| self.marker_err(source))
    }

    fn marker_err(&self, source: io::Error) -> SyncError {
        SyncError::Marker {
            path: self.path.clone(),
            source,
        }
    }
}

// ==============================================================================
// Concrete Implementation (Shell Command)
// ==============================================================================

/// Runs the configured command through `/bin/bash -ec`.
///
/// 🛡️ Shell Boundary: the command string reaches a shell verbatim, so it must come
/// from trusted configuration only. Nothing fetched from the credential store is
/// ever interpolated into it, and the child inherits no secret from this process.
pub struct ShellReloadAction {
    command: String,
}

impl ShellReloadAction {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    fn failure(&self, detail: String) -> SyncError {
        SyncError::Reload {
            command: self.command.clone(),
            detail,
        }
    }
}

#[async_trait]
impl ReloadAction for ShellReloadAction {
    async fn reload(&self) -> Result<()> {
        // 🛡️ kill_on_drop: a run cancelled mid-reload does not leave the child behind.
        let output = Command::new("/bin/bash")
            .arg("-ec")
            .arg(&self.command)
            .env_remove(DATABASE_URL_VAR)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.failure(format!("spawn error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let how = match (output.status.code(), output.status.signal()) {
                (Some(code), _) => format!("exited with code {}", code),
                (None, Some(sig)) => format!("killed by signal {}", sig),
                (None, None) => "terminated abnormally".to_string(),
            };
            return Err(self.failure(if stderr.is_empty() {
                how
            } else {
                format!("{}: {}", how, stderr)
            }));
        }

        info!(command = %self.command, "Reload command succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_lifecycle_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let marker = ReloadMarker::new(dir.path().join("reload.trigger"));

        assert!(!marker.is_owed().unwrap());
        marker.mark_owed().unwrap();
        marker.mark_owed().unwrap();
        assert!(marker.is_owed().unwrap());
        assert_eq!(std::fs::metadata(marker.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_marker_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let marker = ReloadMarker::new(dir.path().join("nope").join("reload.trigger"));
        assert!(matches!(marker.mark_owed(), Err(SyncError::Marker { .. })));
    }

    #[tokio::test]
    async fn test_shell_reload_success() {
        let dir = TempDir::new().unwrap();
        let witness = dir.path().join("reloaded");
        let action = ShellReloadAction::new(format!("touch '{}'", witness.display()));

        action.reload().await.unwrap();
        assert!(witness.exists());
    }

    #[tokio::test]
    async fn test_shell_reload_nonzero_exit_is_error() {
        let action = ShellReloadAction::new("echo pgbouncer down >&2; exit 3".into());
        match action.reload().await {
            Err(SyncError::Reload { detail, .. }) => {
                assert!(detail.contains("code 3"), "{}", detail);
                assert!(detail.contains("pgbouncer down"), "{}", detail);
            }
            other => panic!("expected reload error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shell_reload_signal_is_error() {
        let action = ShellReloadAction::new("kill -KILL $$".into());
        match action.reload().await {
            Err(SyncError::Reload { detail, .. }) => assert!(detail.contains("signal 9"), "{}", detail),
            other => panic!("expected reload error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shell_reload_does_not_see_database_url() {
        // SAFETY: no other test in this crate reads or writes this variable.
        unsafe { std::env::set_var(DATABASE_URL_VAR, "postgres://sync:hunter2@db/postgres") };
        let action = ShellReloadAction::new(format!("test -z \"${{{}+x}}\"", DATABASE_URL_VAR));
        let result = action.reload().await;
        unsafe { std::env::remove_var(DATABASE_URL_VAR) };

        assert!(result.is_ok(), "{:?}", result);
    }
}
