use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{cache::CachedEntry, ClientError};

pub const BACKUP_VERSION: u32 = 1;

/// A JSON snapshot of the cached entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Backup {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<CachedEntry>,
}

impl Backup {
    pub fn new(entries: Vec<CachedEntry>) -> Self {
        Self {
            version: BACKUP_VERSION,
            exported_at: Utc::now(),
            entries,
        }
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a backup file. A bare array of entries is accepted as well.
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Full(Backup),
            Entries(Vec<CachedEntry>),
        }

        match serde_json::from_str::<Raw>(json)? {
            Raw::Full(backup) if backup.version > BACKUP_VERSION => Err(ClientError::Invalid(
                format!("unsupported backup version {}", backup.version),
            )),
            Raw::Full(backup) => Ok(backup),
            Raw::Entries(entries) => Ok(Backup::new(entries)),
        }
    }
}
