//! Local send ledger (`sent_log.json`).
//!
//! A JSON object mapping `name::role::company` to `{message_id, ts}`. Older
//! files keyed rows by `email::role::company`; those keys still count as sent
//! and are migrated to the current key on the next write for that contact.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::contacts::ContactRecord;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Ledger file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Ledger serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Contact identity independent of the email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendKey(String);

/// Identity used by older ledger files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyKey(String);

fn fold_key(parts: [&str; 3]) -> String {
    parts
        .iter()
        .map(|p| p.to_lowercase())
        .collect::<Vec<_>>()
        .join("::")
}

impl SendKey {
    pub fn new(name: &str, role: &str, company: &str) -> Self {
        Self(fold_key([name, role, company]))
    }

    pub fn for_record(record: &ContactRecord) -> Self {
        Self::new(&record.name, &record.role, &record.company)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl LegacyKey {
    pub fn new(email: &str, role: &str, company: &str) -> Self {
        Self(fold_key([email, role, company]))
    }

    pub fn for_record(record: &ContactRecord) -> Self {
        Self::new(&record.email, &record.role, &record.company)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(alias = "msg_id")]
    pub message_id: String,
    /// Unix seconds.
    pub ts: i64,
}

#[derive(Debug)]
pub struct SendLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl SendLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        log::debug!("Ledger {} has {} entries", path.display(), entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn already_sent(&self, key: &SendKey, legacy: &LegacyKey) -> bool {
        self.entries.contains_key(key.as_str()) || self.entries.contains_key(legacy.as_str())
    }

    /// Record a completed attempt, drop any legacy entry, and persist.
    pub fn mark_sent(
        &mut self,
        key: &SendKey,
        legacy: &LegacyKey,
        message_id: &str,
    ) -> Result<(), LedgerError> {
        self.entries.insert(
            key.as_str().to_string(),
            LedgerEntry {
                message_id: message_id.to_string(),
                ts: chrono::Utc::now().timestamp(),
            },
        );
        if legacy.as_str() != key.as_str() {
            self.entries.remove(legacy.as_str());
        }
        self.save()
    }

    /// Write the whole ledger through a temp file and rename.
    pub fn save(&self) -> Result<(), LedgerError> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        crate::util::atomic_write_str(&self.path, &content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
