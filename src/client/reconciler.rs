//! Sync Reconciler
//!
//! Decides for every read and write whether it goes to the server or to the
//! local cache, and replays what was written offline once the server is back.
//!
//! Delivery of offline creations is at-least-once: each draft carries its
//! local uuid as `client_token`, and the server answers a repeated token with
//! the id it already assigned. The cache lock is never held across a request.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    client::{
        api_client::EntryApi,
        backup::Backup,
        cache::{CachedEntry, EntryKey, LocalCache, Resolved},
        connectivity::{Connectivity, ConnectivityMonitor},
        storage::CacheStorage,
        ClientError,
    },
    models::{
        entry::EntryFields,
        extraction::ExtractedInvoice,
        stock_summary::{
            summarize_by_product_destination, summarize_by_supplier, summarize_daily_performance,
            DailyPerformance, ProductDestinationStock, SupplierStock,
        },
    },
};

/// Where the data of a [`DashboardSnapshot`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Server,
    Cache,
}

/// Everything the dashboard renders after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub entries: Vec<CachedEntry>,
    pub by_supplier: Vec<SupplierStock>,
    pub by_product_destination: Vec<ProductDestinationStock>,
    pub daily_performance: Vec<DailyPerformance>,
    pub source: DataSource,
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(i32),
    /// Stored locally for replay. `first_offline_write` is set on the first
    /// queued write since connectivity was lost, for a one-time notice.
    Queued {
        local_id: EntryKey,
        first_offline_write: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Merged into a draft that has not been sent yet.
    DraftUpdated,
    Queued { first_offline_write: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { changes: usize },
    /// A draft that never reached the server was dropped.
    DraftDiscarded,
}

/// What one replay pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<(Uuid, i32)>,
    pub updated: usize,
    pub failed: usize,
    /// Another pass was already running.
    pub skipped: bool,
}

/// Clears the in-flight flag when a replay pass ends, however it ends.
struct ReplayGuard<'a>(&'a AtomicBool);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncReconciler<A: EntryApi, S: CacheStorage> {
    api: Arc<A>,
    cache: Mutex<LocalCache<S>>,
    connectivity: Arc<ConnectivityMonitor>,
    replaying: AtomicBool,
    offline_notice: AtomicBool,
}

impl<A: EntryApi, S: CacheStorage> SyncReconciler<A, S> {
    pub fn new(api: A, cache: LocalCache<S>) -> Self {
        Self::with_monitor(api, cache, Arc::new(ConnectivityMonitor::new()))
    }

    pub fn with_monitor(api: A, cache: LocalCache<S>, connectivity: Arc<ConnectivityMonitor>) -> Self {
        Self {
            api: Arc::new(api),
            cache: Mutex::new(cache),
            connectivity,
            replaying: AtomicBool::new(false),
            offline_notice: AtomicBool::new(false),
        }
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub async fn entries(&self) -> Vec<CachedEntry> {
        self.cache.lock().await.entries().to_vec()
    }

    pub async fn pending_count(&self) -> usize {
        self.cache.lock().await.pending_count()
    }

    pub async fn queued_updates(&self) -> usize {
        self.cache.lock().await.outbox().len()
    }

    /// Resolves a key that may have been handed out before a sync.
    pub async fn resolve(&self, key: EntryKey) -> EntryKey {
        self.cache.lock().await.resolve_key(key)
    }

    fn set_connectivity(&self, next: Connectivity) -> Connectivity {
        let previous = self.connectivity.set(next);
        if next == Connectivity::Offline && previous != Connectivity::Offline {
            self.offline_notice.store(true, Ordering::Release);
        }
        previous
    }

    fn go_offline(&self, reason: &ClientError) {
        warn!(error = %reason, "server unreachable, switching to offline mode");
        self.set_connectivity(Connectivity::Offline);
    }

    fn take_offline_notice(&self) -> bool {
        self.offline_notice.swap(false, Ordering::AcqRel)
    }

    /// Probes the server, replays queued work on reconnect, then loads the
    /// dashboard from the server or, failing that, from the cache.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<DashboardSnapshot, ClientError> {
        match self.api.probe().await {
            Ok(_) => {
                let previous = self.set_connectivity(Connectivity::Online);
                if previous != Connectivity::Online {
                    let report = self.replay_pending().await?;
                    if !report.skipped {
                        info!(
                            created = report.created.len(),
                            updated = report.updated,
                            failed = report.failed,
                            "replayed offline work"
                        );
                    }
                }
            }
            Err(e) => {
                self.go_offline(&e);
                return self.cached_snapshot().await;
            }
        }

        let fetched = tokio::try_join!(
            self.api.list_entries(),
            self.api.stock_by_supplier(),
            self.api.stock_by_product_destination(),
        );
        let (server_entries, by_supplier, by_product_destination) = match fetched {
            Ok(data) => data,
            Err(e) => {
                self.go_offline(&e);
                return self.cached_snapshot().await;
            }
        };

        let mut cache = self.cache.lock().await;
        cache.replace_with_server(&server_entries).await?;
        let entries = cache.entries().to_vec();
        drop(cache);

        Ok(DashboardSnapshot {
            daily_performance: summarize_daily_performance(&entries),
            entries,
            by_supplier,
            by_product_destination,
            source: DataSource::Server,
            connectivity: self.connectivity.current(),
        })
    }

    /// The last cached snapshot with every aggregation computed locally.
    pub async fn cached_snapshot(&self) -> Result<DashboardSnapshot, ClientError> {
        let entries = self.entries().await;
        debug!(count = entries.len(), "serving dashboard from cache");
        Ok(DashboardSnapshot {
            by_supplier: summarize_by_supplier(&entries),
            by_product_destination: summarize_by_product_destination(&entries),
            daily_performance: summarize_daily_performance(&entries),
            entries,
            source: DataSource::Cache,
            connectivity: self.connectivity.current(),
        })
    }

    async fn queue_creation(&self, fields: EntryFields) -> Result<CreateOutcome, ClientError> {
        let local = self.cache.lock().await.insert_pending(fields).await?;
        info!(%local, "entry stored locally for later sync");
        Ok(CreateOutcome::Queued {
            local_id: EntryKey::Local(local),
            first_offline_write: self.take_offline_notice(),
        })
    }

    pub async fn create_entry(&self, fields: EntryFields) -> Result<CreateOutcome, ClientError> {
        if !self.connectivity.is_online() {
            return self.queue_creation(fields).await;
        }

        let token = Uuid::new_v4().to_string();
        match self.api.create_entry(&fields, Some(&token)).await {
            Ok(id) => {
                self.cache
                    .lock()
                    .await
                    .insert_server(id, fields, Some(token))
                    .await?;
                Ok(CreateOutcome::Created(id))
            }
            Err(e) if e.is_connectivity() => {
                self.go_offline(&e);
                self.queue_creation(fields).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn update_entry(
        &self,
        key: EntryKey,
        changes: EntryFields,
    ) -> Result<UpdateOutcome, ClientError> {
        if changes.is_empty() {
            return Err(ClientError::Invalid("No updates provided".to_string()));
        }

        // A draft is edited under the same lock that resolved it, so a replay
        // pass cannot turn it into a server entry in between. Once synced, the
        // key resolves to the server id and the edit is sent or queued.
        let id = {
            let mut cache = self.cache.lock().await;
            if cache.get(key).is_none() && !self.connectivity.is_online() {
                return Err(ClientError::NotFound(key.to_string()));
            }
            match cache.resolve(key) {
                Resolved::Pending(local) => {
                    cache.apply_local(EntryKey::Local(local), &changes).await?;
                    return Ok(UpdateOutcome::DraftUpdated);
                }
                Resolved::Server(id) => id,
            }
        };

        if self.connectivity.is_online() {
            match self.api.update_entry(id, &changes).await {
                Ok(()) => {
                    let mut cache = self.cache.lock().await;
                    if cache.get(EntryKey::Server(id)).is_some() {
                        cache.apply_local(EntryKey::Server(id), &changes).await?;
                    }
                    return Ok(UpdateOutcome::Applied);
                }
                Err(e) if e.is_connectivity() => self.go_offline(&e),
                Err(e) => return Err(e),
            }
        }

        let mut cache = self.cache.lock().await;
        cache.apply_local(EntryKey::Server(id), &changes).await?;
        cache.queue_update(id, changes).await?;
        drop(cache);
        Ok(UpdateOutcome::Queued {
            first_offline_write: self.take_offline_notice(),
        })
    }

    /// Deleting a server entry needs the server; drafts are dropped locally.
    pub async fn delete_entry(&self, key: EntryKey) -> Result<DeleteOutcome, ClientError> {
        let id = {
            let mut cache = self.cache.lock().await;
            match cache.resolve(key) {
                Resolved::Pending(local) => {
                    return match cache.remove(EntryKey::Local(local)).await? {
                        Some(_) => Ok(DeleteOutcome::DraftDiscarded),
                        None => Err(ClientError::NotFound(key.to_string())),
                    };
                }
                Resolved::Server(id) => id,
            }
        };

        if !self.connectivity.is_online() {
            return Err(ClientError::Offline(format!(
                "entry {} can only be deleted while online",
                id
            )));
        }

        match self.api.delete_entry(id).await {
            Ok(changes) => {
                self.cache.lock().await.remove(EntryKey::Server(id)).await?;
                Ok(DeleteOutcome::Deleted { changes })
            }
            Err(e) if e.is_connectivity() => {
                self.go_offline(&e);
                Err(ClientError::Offline(format!(
                    "entry {} can only be deleted while online",
                    id
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Sends pending creations, then queued updates, one request at a time.
    ///
    /// Only one pass runs at a time; a concurrent call returns a report with
    /// `skipped` set. Failed items stay queued for the next reconnect.
    #[instrument(skip(self))]
    pub async fn replay_pending(&self) -> Result<SyncReport, ClientError> {
        if self.replaying.swap(true, Ordering::AcqRel) {
            debug!("replay already in progress");
            return Ok(SyncReport {
                skipped: true,
                ..Default::default()
            });
        }
        let _guard = ReplayGuard(&self.replaying);
        let mut report = SyncReport::default();

        let drafts = self.cache.lock().await.pending_drafts();
        for draft in drafts {
            match self
                .api
                .create_entry(&draft.fields, Some(&draft.client_token))
                .await
            {
                Ok(id) => {
                    let edited = self
                        .cache
                        .lock()
                        .await
                        .mark_synced(draft.local, id, &draft.fields)
                        .await?;
                    if edited {
                        debug!(local = %draft.local, id, "draft edited during sync, update queued");
                    }
                    report.created.push((draft.local, id));
                }
                Err(e) => {
                    warn!(local = %draft.local, error = %e, "failed to sync pending entry");
                    report.failed += 1;
                    if e.is_connectivity() {
                        self.go_offline(&e);
                        return Ok(report);
                    }
                }
            }
        }

        let queued = self.cache.lock().await.outbox().to_vec();
        for op in queued {
            match self.api.update_entry(op.id, &op.changes).await {
                Ok(()) => {
                    self.cache.lock().await.dequeue(op.op_id).await?;
                    report.updated += 1;
                }
                Err(e) if e.status() == Some(404) => {
                    warn!(id = op.id, "queued update targets a deleted entry, dropping it");
                    self.cache.lock().await.dequeue(op.op_id).await?;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(id = op.id, error = %e, "failed to replay queued update");
                    report.failed += 1;
                    if e.is_connectivity() {
                        self.go_offline(&e);
                        return Ok(report);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Asks the server to pre-fill a draft from invoice text.
    pub async fn extract_invoice(&self, content: &str) -> Result<ExtractedInvoice, ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::Invalid("Content is required".to_string()));
        }
        match self.api.parse_invoice(content).await {
            Err(e) if e.is_connectivity() => {
                self.go_offline(&e);
                Err(ClientError::Offline("invoice extraction needs the server".to_string()))
            }
            other => other,
        }
    }

    pub async fn export_backup(&self) -> Backup {
        Backup::new(self.entries().await)
    }

    /// Replaces the cached entries with a backup. Local-keyed entries become
    /// pending again and are sent right away when online.
    pub async fn import_backup(&self, backup: Backup) -> Result<Option<SyncReport>, ClientError> {
        let count = backup.entries.len();
        self.cache.lock().await.replace_all(backup.entries).await?;
        info!(count, "backup imported");

        if self.connectivity.is_online() {
            return self.replay_pending().await.map(Some);
        }
        Ok(None)
    }
}
