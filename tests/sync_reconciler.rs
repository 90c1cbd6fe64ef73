use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Notify;

use stockpro::{
    api::health_controller::HealthResponse,
    client::{
        Backup, ClientError, Connectivity, CreateOutcome, DataSource, DeleteOutcome, EntryApi,
        EntryKey, LocalCache, MemoryStorage, SyncReconciler, UpdateOutcome,
    },
    models::{
        entry::{Entry, EntryFields, EntryStatus},
        extraction::ExtractedInvoice,
        stock_summary::{
            summarize_by_product_destination, summarize_by_supplier, ProductDestinationStock,
            SupplierStock,
        },
    },
};

#[derive(Default)]
struct Ledger {
    entries: Vec<Entry>,
    next_id: i32,
    tokens: HashMap<String, i32>,
}

/// In-memory stand-in for the server. `online` toggles reachability,
/// `lose_next_create` stores a creation but drops the response and
/// `create_gate` holds the next creation until notified.
#[derive(Clone, Default)]
struct FakeServer {
    ledger: Arc<Mutex<Ledger>>,
    online: Arc<AtomicBool>,
    lose_next_create: Arc<AtomicBool>,
    create_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeServer {
    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<(), ClientError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::Network("connection refused".into()))
        }
    }

    fn rows(&self) -> Vec<Entry> {
        self.ledger.lock().unwrap().entries.clone()
    }

    fn seed(&self, fields: EntryFields) -> i32 {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.next_id += 1;
        let id = ledger.next_id;
        ledger
            .entries
            .insert(0, Entry::from_fields(id, fields, Utc::now().naive_utc()));
        id
    }
}

#[async_trait]
impl EntryApi for FakeServer {
    async fn probe(&self) -> Result<HealthResponse, ClientError> {
        self.reachable()?;
        Ok(HealthResponse {
            status: "ok".into(),
            database: true,
            env: "local".into(),
        })
    }

    async fn list_entries(&self) -> Result<Vec<Entry>, ClientError> {
        self.reachable()?;
        Ok(self.rows())
    }

    async fn stock_by_supplier(&self) -> Result<Vec<SupplierStock>, ClientError> {
        self.reachable()?;
        Ok(summarize_by_supplier(&self.rows()))
    }

    async fn stock_by_product_destination(&self) -> Result<Vec<ProductDestinationStock>, ClientError> {
        self.reachable()?;
        Ok(summarize_by_product_destination(&self.rows()))
    }

    async fn create_entry(
        &self,
        fields: &EntryFields,
        client_token: Option<&str>,
    ) -> Result<i32, ClientError> {
        self.reachable()?;
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let id = {
            let mut ledger = self.ledger.lock().unwrap();
            if let Some(id) = client_token.and_then(|t| ledger.tokens.get(t).copied()) {
                id
            } else {
                ledger.next_id += 1;
                let id = ledger.next_id;
                let mut entry = Entry::from_fields(id, fields.clone(), Utc::now().naive_utc());
                entry.client_token = client_token.map(str::to_string);
                ledger.entries.insert(0, entry);
                if let Some(token) = client_token {
                    ledger.tokens.insert(token.to_string(), id);
                }
                id
            }
        };
        if self.lose_next_create.swap(false, Ordering::SeqCst) {
            self.set_online(false);
            return Err(ClientError::Network("connection reset".into()));
        }
        Ok(id)
    }

    async fn update_entry(&self, id: i32, changes: &EntryFields) -> Result<(), ClientError> {
        self.reachable()?;
        let mut ledger = self.ledger.lock().unwrap();
        let Some(entry) = ledger.entries.iter_mut().find(|e| e.id == id) else {
            return Err(ClientError::Server {
                status: 404,
                message: format!("Entry with id {} not found", id),
            });
        };
        let mut fields = EntryFields::from(&*entry);
        fields.merge(changes);
        let replacement = Entry::from_fields(id, fields, entry.created_at);
        *entry = Entry {
            client_token: entry.client_token.clone(),
            ..replacement
        };
        Ok(())
    }

    async fn delete_entry(&self, id: i32) -> Result<usize, ClientError> {
        self.reachable()?;
        let mut ledger = self.ledger.lock().unwrap();
        let before = ledger.entries.len();
        ledger.entries.retain(|e| e.id != id);
        Ok(before - ledger.entries.len())
    }

    async fn parse_invoice(&self, _content: &str) -> Result<ExtractedInvoice, ClientError> {
        self.reachable()?;
        Ok(serde_json::from_value(serde_json::json!({ "nf_numero": "1" }))?)
    }
}

fn draft(fornecedor: &str) -> EntryFields {
    EntryFields {
        fornecedor: Some(fornecedor.to_string()),
        tonelada: Some(10.0),
        ..Default::default()
    }
}

async fn reconciler(server: &FakeServer) -> SyncReconciler<FakeServer, MemoryStorage> {
    let cache = LocalCache::open(MemoryStorage::new()).await.unwrap();
    SyncReconciler::new(server.clone(), cache)
}

#[tokio::test]
async fn test_pending_entries_reconcile_without_duplicates() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;

    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(snapshot.source, DataSource::Cache);
    assert_eq!(snapshot.connectivity, Connectivity::Offline);

    let a = sync.create_entry(draft("A")).await.unwrap();
    let b = sync.create_entry(draft("B")).await.unwrap();
    assert!(matches!(
        a,
        CreateOutcome::Queued {
            first_offline_write: true,
            ..
        }
    ));
    assert!(matches!(
        b,
        CreateOutcome::Queued {
            first_offline_write: false,
            ..
        }
    ));
    assert_eq!(sync.pending_count().await, 2);

    server.set_online(true);
    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(snapshot.source, DataSource::Server);
    assert_eq!(snapshot.connectivity, Connectivity::Online);
    assert_eq!(snapshot.entries.len(), 2);
    assert!(snapshot.entries.iter().all(|e| !e.is_pending));
    assert!(snapshot.entries.iter().all(|e| e.id.server_id().is_some()));

    let again = sync.refresh().await.unwrap();
    assert_eq!(again.entries.len(), 2);
    assert_eq!(server.rows().len(), 2);

    // A was queued first and is replayed first.
    let rows = server.rows();
    assert_eq!(rows[1].fornecedor.as_deref(), Some("A"));
    assert_eq!(rows[0].fornecedor.as_deref(), Some("B"));

    if let CreateOutcome::Queued { local_id, .. } = a {
        let resolved = sync.resolve(local_id).await;
        assert_eq!(resolved, EntryKey::Server(rows[1].id));
    }
}

#[tokio::test]
async fn test_lost_create_response_is_deduplicated_on_retry() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();
    sync.create_entry(draft("A")).await.unwrap();

    server.set_online(true);
    server.lose_next_create.store(true, Ordering::SeqCst);
    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(snapshot.source, DataSource::Cache);
    assert_eq!(sync.pending_count().await, 1);
    assert_eq!(server.rows().len(), 1);

    server.set_online(true);
    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(snapshot.source, DataSource::Server);
    assert_eq!(server.rows().len(), 1);
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(sync.pending_count().await, 0);
}

#[tokio::test]
async fn test_online_writes_go_straight_to_server() {
    let server = FakeServer::default();
    server.set_online(true);
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    let id = match sync.create_entry(draft("A")).await.unwrap() {
        CreateOutcome::Created(id) => id,
        other => panic!("expected a server id, got {:?}", other),
    };
    let changes = EntryFields {
        status: Some(EntryStatus::Embarcado),
        ..Default::default()
    };
    assert_eq!(
        sync.update_entry(EntryKey::Server(id), changes).await.unwrap(),
        UpdateOutcome::Applied
    );
    assert_eq!(server.rows()[0].status, EntryStatus::Embarcado);

    assert!(matches!(
        sync.update_entry(EntryKey::Server(id), EntryFields::default())
            .await,
        Err(ClientError::Invalid(_))
    ));

    assert_eq!(
        sync.delete_entry(EntryKey::Server(id)).await.unwrap(),
        DeleteOutcome::Deleted { changes: 1 }
    );
    assert!(server.rows().is_empty());
    assert!(sync.entries().await.is_empty());
}

#[tokio::test]
async fn test_offline_update_is_replayed() {
    let server = FakeServer::default();
    server.set_online(true);
    let id = server.seed(draft("A"));
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    server.set_online(false);
    let changes = EntryFields {
        destino: Some("Porto".into()),
        ..Default::default()
    };
    let outcome = sync
        .update_entry(EntryKey::Server(id), changes)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Queued {
            first_offline_write: true
        }
    );
    assert_eq!(sync.queued_updates().await, 1);
    assert_eq!(sync.entries().await[0].fields.destino.as_deref(), Some("Porto"));
    assert_eq!(server.rows()[0].destino, None);

    server.set_online(true);
    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(sync.queued_updates().await, 0);
    assert_eq!(server.rows()[0].destino.as_deref(), Some("Porto"));
    assert_eq!(snapshot.entries[0].fields.destino.as_deref(), Some("Porto"));
}

#[tokio::test]
async fn test_queued_update_of_deleted_entry_is_dropped() {
    let server = FakeServer::default();
    server.set_online(true);
    let id = server.seed(draft("A"));
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    server.set_online(false);
    let changes = EntryFields {
        destino: Some("Porto".into()),
        ..Default::default()
    };
    sync.update_entry(EntryKey::Server(id), changes).await.unwrap();

    server.ledger.lock().unwrap().entries.clear();
    server.set_online(true);
    let report = sync.replay_pending().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(sync.queued_updates().await, 0);
}

#[tokio::test]
async fn test_drafts_edited_and_deleted_locally() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    let local = match sync.create_entry(draft("A")).await.unwrap() {
        CreateOutcome::Queued { local_id, .. } => local_id,
        other => panic!("expected a queued draft, got {:?}", other),
    };
    let changes = EntryFields {
        tonelada: Some(99.0),
        ..Default::default()
    };
    assert_eq!(
        sync.update_entry(local, changes).await.unwrap(),
        UpdateOutcome::DraftUpdated
    );
    assert_eq!(sync.entries().await[0].fields.tonelada, Some(99.0));
    assert_eq!(sync.queued_updates().await, 0);

    assert_eq!(
        sync.delete_entry(local).await.unwrap(),
        DeleteOutcome::DraftDiscarded
    );
    assert!(sync.entries().await.is_empty());

    server.set_online(true);
    sync.refresh().await.unwrap();
    assert!(server.rows().is_empty());
}

#[tokio::test]
async fn test_draft_edited_during_replay_reaches_server() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();
    let local = match sync.create_entry(draft("A")).await.unwrap() {
        CreateOutcome::Queued { local_id, .. } => local_id,
        other => panic!("expected a queued draft, got {:?}", other),
    };

    let gate = Arc::new(Notify::new());
    *server.create_gate.lock().unwrap() = Some(gate.clone());
    server.set_online(true);

    let edit = async {
        let changes = EntryFields {
            destino: Some("Porto".into()),
            ..Default::default()
        };
        let outcome = sync.update_entry(local, changes).await.unwrap();
        gate.notify_one();
        outcome
    };
    let (snapshot, outcome) = tokio::join!(sync.refresh(), edit);
    let snapshot = snapshot.unwrap();
    assert!(matches!(
        outcome,
        UpdateOutcome::DraftUpdated | UpdateOutcome::Applied
    ));

    sync.refresh().await.unwrap();
    let rows = server.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].destino.as_deref(), Some("Porto"));
    assert_eq!(sync.queued_updates().await, 0);
    assert_eq!(snapshot.source, DataSource::Server);
}

#[tokio::test]
async fn test_synced_draft_key_edits_the_server_entry() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();
    let local = match sync.create_entry(draft("A")).await.unwrap() {
        CreateOutcome::Queued { local_id, .. } => local_id,
        other => panic!("expected a queued draft, got {:?}", other),
    };

    server.set_online(true);
    sync.refresh().await.unwrap();
    let id = server.rows()[0].id;

    let changes = EntryFields {
        destino: Some("Porto".into()),
        ..Default::default()
    };
    assert_eq!(
        sync.update_entry(local, changes).await.unwrap(),
        UpdateOutcome::Applied
    );
    assert_eq!(server.rows()[0].destino.as_deref(), Some("Porto"));

    server.set_online(false);
    let changes = EntryFields {
        tonelada: Some(5.0),
        ..Default::default()
    };
    assert_eq!(
        sync.update_entry(local, changes).await.unwrap(),
        UpdateOutcome::Queued {
            first_offline_write: true
        }
    );
    assert_eq!(sync.queued_updates().await, 1);
    assert_eq!(sync.pending_count().await, 0);

    server.set_online(true);
    sync.refresh().await.unwrap();
    assert_eq!(server.rows()[0].tonelada, Some(5.0));
    assert_eq!(sync.resolve(local).await, EntryKey::Server(id));
}

#[tokio::test]
async fn test_server_entry_cannot_be_deleted_offline() {
    let server = FakeServer::default();
    server.set_online(true);
    let id = server.seed(draft("A"));
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    server.set_online(false);
    sync.refresh().await.unwrap();
    assert!(matches!(
        sync.delete_entry(EntryKey::Server(id)).await,
        Err(ClientError::Offline(_))
    ));
    assert_eq!(sync.entries().await.len(), 1);
}

#[tokio::test]
async fn test_offline_summaries_include_pending_entries() {
    let server = FakeServer::default();
    server.set_online(true);
    server.seed(EntryFields {
        status: Some(EntryStatus::Embarcado),
        ..draft("A")
    });
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    server.set_online(false);
    sync.create_entry(draft("A")).await.unwrap();
    let snapshot = sync.refresh().await.unwrap();
    assert_eq!(snapshot.source, DataSource::Cache);
    assert_eq!(
        snapshot.by_supplier,
        vec![SupplierStock {
            fornecedor: Some("A".into()),
            in_stock: 1,
            exited: 1,
        }]
    );
    assert_eq!(snapshot.daily_performance.len(), 1);
    assert_eq!(snapshot.daily_performance[0].entries, 2);
}

#[tokio::test]
async fn test_connectivity_listeners_see_transitions() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    sync.connectivity()
        .on_change(move |previous, next| sink.lock().unwrap().push((previous, next)));

    sync.refresh().await.unwrap();
    sync.refresh().await.unwrap();
    server.set_online(true);
    sync.refresh().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (Connectivity::Checking, Connectivity::Offline),
            (Connectivity::Offline, Connectivity::Online),
        ]
    );
}

#[tokio::test]
async fn test_backup_restores_pending_drafts() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();
    sync.create_entry(draft("A")).await.unwrap();

    let json = sync.export_backup().await.to_json().unwrap();
    let backup = Backup::from_json(&json).unwrap();
    assert_eq!(backup.entries.len(), 1);

    server.set_online(true);
    let restored = reconciler(&server).await;
    restored.refresh().await.unwrap();
    let report = restored.import_backup(backup).await.unwrap().unwrap();
    assert_eq!(report.created.len(), 1);
    assert_eq!(server.rows().len(), 1);
    assert_eq!(restored.pending_count().await, 0);
}

#[tokio::test]
async fn test_backup_round_trip_keeps_every_field() {
    let server = FakeServer::default();
    server.set_online(true);
    server.seed(EntryFields {
        mes: Some("Janeiro".into()),
        nf_numero: Some("4471".into()),
        valor: Some(-12.5),
        data_nf: NaiveDate::from_ymd_opt(2024, 1, 2),
        data_descarga: NaiveDate::from_ymd_opt(2024, 1, 3),
        status: Some(EntryStatus::Embarcado),
        destino: Some("Serra - ES".into()),
        data_faturamento_vli: NaiveDate::from_ymd_opt(2024, 1, 9),
        cte_vli: Some("CTE-1".into()),
        numero_vagao: Some("V-88".into()),
        hora_chegada: NaiveTime::from_hms_opt(7, 15, 0),
        hora_entrada: NaiveTime::from_hms_opt(7, 45, 30),
        hora_saida: NaiveTime::from_hms_opt(9, 5, 0),
        ..draft("A")
    });
    let sync = reconciler(&server).await;
    sync.refresh().await.unwrap();

    server.set_online(false);
    sync.create_entry(EntryFields {
        data_nf: NaiveDate::from_ymd_opt(2024, 2, 1),
        hora_chegada: NaiveTime::from_hms_opt(6, 0, 0),
        status: Some(EntryStatus::Rejeitado),
        cte_transportador: Some("CT-9".into()),
        ..draft("B")
    })
    .await
    .unwrap();

    let exported = sync.entries().await;
    assert_eq!(exported.len(), 2);
    let json = sync.export_backup().await.to_json().unwrap();

    let restored = reconciler(&server).await;
    let report = restored
        .import_backup(Backup::from_json(&json).unwrap())
        .await
        .unwrap();
    assert!(report.is_none());
    assert_eq!(restored.entries().await, exported);
    assert_eq!(restored.pending_count().await, 1);
    assert_eq!(server.rows().len(), 1);
}

#[tokio::test]
async fn test_invoice_extraction_needs_the_server() {
    let server = FakeServer::default();
    let sync = reconciler(&server).await;
    assert!(matches!(
        sync.extract_invoice("  ").await,
        Err(ClientError::Invalid(_))
    ));
    assert!(matches!(
        sync.extract_invoice("NF-e 1").await,
        Err(ClientError::Offline(_))
    ));
    server.set_online(true);
    let invoice = sync.extract_invoice("NF-e 1").await.unwrap();
    assert_eq!(invoice.nf_numero.as_deref(), Some("1"));
}
