// src/sys/secrets.rs

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{Result, SyncError};
use crate::sys::render::render_line;

/// One role and its stored password hash, as returned by the credential store.
///
/// 1. It cannot be accidentally logged: `Debug` prints the principal and
///    `[REDACTED]` in place of the secret.
/// 2. The secret lives in a zeroizing `SecretString`, so the heap buffer is
///    wiped the moment the record is dropped instead of lingering until reuse.
pub struct CredentialRecord {
    principal: String,
    secret: SecretString,
}

impl CredentialRecord {
    pub fn new(principal: impl Into<String>, secret: String) -> Self {
        Self {
            principal: principal.into(),
            secret: SecretString::new(secret),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Exposes the secret only for the duration of `action`.
    ///
    /// 🛡️ Lexical Scope Confinement: the plaintext is handed out as a borrow
    /// inside the closure, so the borrow checker guarantees it cannot escape
    /// into a field, a log line or a task that outlives this call.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        action(self.secret.expose_secret())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("principal", &self.principal)
            .field("secret", &self.secret)
            .finish()
    }
}

/// A batch of records with at most one record per principal.
#[derive(Debug, Default)]
pub struct CredentialSet {
    records: Vec<CredentialRecord>,
}

impl CredentialSet {
    /// Collapses duplicate principals to the record with the lowest rendered line,
    /// so the surviving secret never depends on the order rows arrived in.
    pub fn new(records: Vec<CredentialRecord>) -> Self {
        let mut by_principal: HashMap<String, CredentialRecord> =
            HashMap::with_capacity(records.len());
        for record in records {
            match by_principal.entry(record.principal.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    warn!(principal = %record.principal, "Duplicate principal in credential set, keeping one record");
                    // Rendered lines carry the secret; wipe them once compared.
                    let challenger = Zeroizing::new(render_line(&record));
                    let current = Zeroizing::new(render_line(slot.get()));
                    if *challenger < *current {
                        slot.insert(record);
                    }
                }
            }
        }
        Self {
            records: by_principal.into_values().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Line breaks in either field would split a record across auth_file lines.
    pub fn check_renderable(&self) -> Result<()> {
        for record in &self.records {
            if has_line_break(&record.principal) {
                return Err(SyncError::Render(format!(
                    "principal {:?} contains a line break",
                    record.principal
                )));
            }
            if record.use_secret(has_line_break) {
                return Err(SyncError::Render(format!(
                    "secret of principal {:?} contains a line break",
                    record.principal
                )));
            }
        }
        Ok(())
    }
}

fn has_line_break(field: &str) -> bool {
    field.contains(['\n', '\r'])
}
