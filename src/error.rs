// src/error.rs

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for a sync run.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Every way a run can fail. Each variant belongs to exactly one pipeline stage,
/// so the diagnostic printed at the process boundary says where the run stopped.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Startup configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Could not open a session against the credential store.
    #[error("failed to connect to credential store")]
    Connect(#[source] sqlx::Error),

    /// The credential query (or its transaction) was rejected.
    #[error("credential query failed")]
    Query(#[source] sqlx::Error),

    /// A returned row did not have the expected shape.
    #[error("failed to decode credential row")]
    Decode(#[source] sqlx::Error),

    /// The store round trip did not finish inside the run budget.
    #[error("credential fetch exceeded the {0:?} budget")]
    Timeout(Duration),

    /// Rendering is total; seeing this means a broken invariant upstream.
    #[error("render invariant violated: {0}")]
    Render(String),

    #[error("failed to write temporary userlist next to {path}")]
    TempWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fingerprint {path}")]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The live file is untouched when this is returned.
    #[error("failed to back up {path} to {backup}")]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish {path}")]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to access reload marker {path}")]
    Marker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new userlist is already live when this is returned.
    #[error("reload command `{command}` failed: {detail}")]
    Reload { command: String, detail: String },

    /// Another run holds the lock on the same userlist.
    #[error("another run holds {path}")]
    Locked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    /// Short name of the stage that failed, used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Locked { .. } => "lock",
            Self::Connect(_) | Self::Query(_) | Self::Decode(_) | Self::Timeout(_) => "fetch",
            Self::Render(_) => "render",
            Self::TempWrite { .. } | Self::Fingerprint { .. } => "compare",
            Self::Backup { .. } => "backup",
            Self::Publish { .. } => "publish",
            Self::Marker { .. } | Self::Reload { .. } => "reload",
        }
    }

    /// True when the run failed after the new userlist was already published.
    pub fn left_published_state(&self) -> bool {
        matches!(self, Self::Marker { .. } | Self::Reload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_stage_names() {
        assert_eq!(SyncError::Config("x".into()).stage(), "config");
        assert_eq!(SyncError::Timeout(Duration::from_secs(1)).stage(), "fetch");
        assert_eq!(SyncError::Query(sqlx::Error::RowNotFound).stage(), "fetch");
        assert_eq!(
            SyncError::Reload { command: "true".into(), detail: "x".into() }.stage(),
            "reload"
        );
    }

    #[test]
    fn test_io_variants_keep_cause_chain() {
        let err = SyncError::Backup {
            path: PathBuf::from("/etc/pgbouncer/userlist.txt"),
            backup: PathBuf::from("/etc/pgbouncer/userlist.txt.backup-1"),
            source: io::Error::new(io::ErrorKind::StorageFull, "disk full"),
        };
        assert!(err.to_string().contains("userlist.txt.backup-1"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk full".to_string()));
        assert!(!err.left_published_state());
    }
}
