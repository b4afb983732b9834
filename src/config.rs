// src/config.rs

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, SyncError};

pub const DATABASE_URL_VAR: &str = "USERLIST_DATABASE_URL";

pub const DEFAULT_USERLIST_PATH: &str = "/etc/pgbouncer/userlist.txt";
pub const DEFAULT_EXCLUDE: &str = "postgres,replicator,monitor";
pub const DEFAULT_RELOAD_MARKER: &str = "/tmp/pgbouncer-userlist-generator.trigger";
pub const DEFAULT_RELOAD_COMMAND: &str = "systemctl reload pgbouncer";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Everything a run needs, fixed at process start and passed down by value.
#[derive(Debug)]
pub struct SyncConfig {
    // 🛡️ Connection descriptor may embed a password
    pub database_url: SecretString,

    pub userlist_path: PathBuf,
    pub exclude: Vec<String>,
    pub reload_marker: PathBuf,
    // 🛡️ Executed through a shell; operator-controlled only
    pub reload_command: String,

    /// Budget for the whole store round trip (connect + query + decode).
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value lookup; `load` wires this to the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SyncError::Config("USERLIST_DATABASE_URL must be set".into()))?;

        let timeout_secs = match lookup("USERLIST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                SyncError::Config(format!(
                    "USERLIST_TIMEOUT_SECS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let reload_command =
            lookup("USERLIST_RELOAD_COMMAND").unwrap_or_else(|| DEFAULT_RELOAD_COMMAND.to_string());
        if reload_command.trim().is_empty() {
            return Err(SyncError::Config("USERLIST_RELOAD_COMMAND cannot be empty".into()));
        }

        let userlist_path = PathBuf::from(
            lookup("USERLIST_PATH").unwrap_or_else(|| DEFAULT_USERLIST_PATH.to_string()),
        );
        if userlist_path.file_name().is_none() {
            return Err(SyncError::Config(format!(
                "USERLIST_PATH must name a file, got '{}'",
                userlist_path.display()
            )));
        }

        Ok(Self {
            database_url: SecretString::new(database_url),
            userlist_path,
            exclude: parse_exclude(
                &lookup("USERLIST_EXCLUDE").unwrap_or_else(|| DEFAULT_EXCLUDE.to_string()),
            ),
            reload_marker: PathBuf::from(
                lookup("USERLIST_RELOAD_TRIGGER_FILE")
                    .unwrap_or_else(|| DEFAULT_RELOAD_MARKER.to_string()),
            ),
            reload_command,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Sibling of the live userlist used to serialise runs.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.userlist_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Connection descriptor with any password replaced, safe for logs.
    ///
    /// 🛡️ The only sanctioned way to print the descriptor; `Debug` on the config
    /// shows `[REDACTED]` for the whole field.
    pub fn redacted_database_url(&self) -> String {
        crate::sys::postgres::scrub_credentials(self.database_url.expose_secret())
    }
}

fn parse_exclude(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
