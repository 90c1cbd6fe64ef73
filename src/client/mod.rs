//! Offline-first client for the StockPro HTTP API.
//!
//! [`LocalCache`] mirrors the ledger on durable storage, [`ConnectivityMonitor`]
//! tracks whether the server is reachable and [`SyncReconciler`] routes reads
//! and writes between the two, replaying queued work when the server returns.

use std::time::Duration;

use thiserror::Error;

pub mod api_client;
pub mod backup;
pub mod cache;
pub mod connectivity;
pub mod reconciler;
pub mod storage;

pub use api_client::{EntryApi, HttpEntryApi};
pub use backup::Backup;
pub use cache::{CachedEntry, EntryKey, LocalCache, QueuedUpdate};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use reconciler::{
    CreateOutcome, DashboardSnapshot, DataSource, DeleteOutcome, SyncReconciler, SyncReport,
    UpdateOutcome,
};
pub use storage::{CacheStorage, FileStorage, MemoryStorage};

/// Client-side failures
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-success status; `message` is its `error` field.
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The operation needs the server and the server is unreachable.
    #[error("Offline: {0}")]
    Offline(String),

    #[error("Entry not found: {0}")]
    NotFound(String),
}

impl ClientError {
    /// True for failures that say nothing about the request itself, only
    /// that the server could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
