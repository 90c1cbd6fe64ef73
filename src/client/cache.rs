//! Client Data Cache
//!
//! Durable mirror of the ledger plus the write-ahead state needed to work
//! offline: pending creations live in the entry list itself (keyed by a
//! local id), queued updates of server entries live in the outbox, and the
//! id map remembers which server id each local id became.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{
    client::{storage::CacheStorage, ClientError},
    constants,
    models::entry::{Entry, EntryFields, EntryStatus, StockRecord},
};

/// Identity of a cached entry.
///
/// Serialized as the server's integer id, or as `"local-<uuid>"` for entries
/// that have not reached the server; the two forms can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    Local(Uuid),
    Server(i32),
}

impl EntryKey {
    pub fn new_local() -> Self {
        EntryKey::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, EntryKey::Local(_))
    }

    pub fn server_id(&self) -> Option<i32> {
        match self {
            EntryKey::Server(id) => Some(*id),
            EntryKey::Local(_) => None,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Local(uuid) => write!(f, "{}{}", constants::LOCAL_ID_PREFIX, uuid),
            EntryKey::Server(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for EntryKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(constants::LOCAL_ID_PREFIX) {
            return Uuid::parse_str(rest)
                .map(EntryKey::Local)
                .map_err(|e| format!("invalid local id '{}': {}", s, e));
        }
        s.parse::<i32>()
            .map(EntryKey::Server)
            .map_err(|_| format!("invalid entry id '{}'", s))
    }
}

impl Serialize for EntryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntryKey::Server(id) => serializer.serialize_i32(*id),
            EntryKey::Local(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for EntryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => i32::try_from(n)
                .map(EntryKey::Server)
                .map_err(|_| de::Error::custom(format!("entry id out of range: {}", n))),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

/// One cached entry as stored under `stockpro_entries`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub id: EntryKey,
    #[serde(flatten)]
    pub fields: EntryFields,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    #[serde(rename = "isPending", default)]
    pub is_pending: bool,
}

impl CachedEntry {
    pub fn from_server(entry: &Entry) -> Self {
        Self {
            id: EntryKey::Server(entry.id),
            fields: EntryFields::from(entry),
            created_at: Some(entry.created_at),
            client_token: entry.client_token.clone(),
            is_pending: false,
        }
    }

    fn pending(local: Uuid, mut fields: EntryFields) -> Self {
        fields.status.get_or_insert(EntryStatus::Estoque);
        Self {
            id: EntryKey::Local(local),
            fields,
            created_at: Some(Utc::now().naive_utc()),
            client_token: Some(local.to_string()),
            is_pending: true,
        }
    }
}

impl StockRecord for CachedEntry {
    fn fornecedor(&self) -> Option<&str> {
        self.fields.fornecedor()
    }
    fn descricao_produto(&self) -> Option<&str> {
        self.fields.descricao_produto()
    }
    fn destino(&self) -> Option<&str> {
        self.fields.destino()
    }
    fn status(&self) -> Option<EntryStatus> {
        self.fields.status
    }
    fn tonelada(&self) -> Option<f64> {
        self.fields.tonelada
    }
    fn data_descarga(&self) -> Option<NaiveDate> {
        self.fields.data_descarga
    }
    fn hora_chegada(&self) -> Option<NaiveTime> {
        self.fields.hora_chegada
    }
    fn hora_entrada(&self) -> Option<NaiveTime> {
        self.fields.hora_entrada
    }
    fn hora_saida(&self) -> Option<NaiveTime> {
        self.fields.hora_saida
    }
}

/// An update of a server entry made while offline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueuedUpdate {
    pub op_id: Uuid,
    pub id: i32,
    pub changes: EntryFields,
    pub queued_at: chrono::DateTime<Utc>,
}

/// A pending creation as handed to the replay loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDraft {
    pub local: Uuid,
    pub fields: EntryFields,
    pub client_token: String,
}

/// Result of resolving a key against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Still only local.
    Pending(Uuid),
    Server(i32),
}

pub struct LocalCache<S: CacheStorage> {
    storage: S,
    entries: Vec<CachedEntry>,
    outbox: Vec<QueuedUpdate>,
    id_map: BTreeMap<Uuid, i32>,
}

async fn load_key<S, T>(storage: &S, key: &str) -> Result<T, ClientError>
where
    S: CacheStorage,
    T: serde::de::DeserializeOwned + Default,
{
    let Some(raw) = storage.load(key).await? else {
        return Ok(T::default());
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable cache value");
            Ok(T::default())
        }
    }
}

impl<S: CacheStorage> LocalCache<S> {
    /// Loads the three cache keys. Missing or unreadable values start empty.
    pub async fn open(storage: S) -> Result<Self, ClientError> {
        let entries = load_key(&storage, constants::CACHE_ENTRIES_KEY).await?;
        let outbox = load_key(&storage, constants::CACHE_OUTBOX_KEY).await?;
        let id_map = load_key(&storage, constants::CACHE_ID_MAP_KEY).await?;
        Ok(Self {
            storage,
            entries,
            outbox,
            id_map,
        })
    }

    pub fn entries(&self) -> &[CachedEntry] {
        &self.entries
    }

    pub fn outbox(&self) -> &[QueuedUpdate] {
        &self.outbox
    }

    pub fn id_map(&self) -> &BTreeMap<Uuid, i32> {
        &self.id_map
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending).count()
    }

    pub fn get(&self, key: EntryKey) -> Option<&CachedEntry> {
        let key = self.resolve_key(key);
        self.entries.iter().find(|e| e.id == key)
    }

    fn position(&self, key: EntryKey) -> Option<usize> {
        self.entries.iter().position(|e| e.id == key)
    }

    /// Follows the id map, so a local key handed out before a sync still
    /// finds its entry afterwards.
    pub fn resolve_key(&self, key: EntryKey) -> EntryKey {
        match key {
            EntryKey::Local(local) => self
                .id_map
                .get(&local)
                .map(|id| EntryKey::Server(*id))
                .unwrap_or(key),
            server => server,
        }
    }

    pub fn resolve(&self, key: EntryKey) -> Resolved {
        match self.resolve_key(key) {
            EntryKey::Local(local) => Resolved::Pending(local),
            EntryKey::Server(id) => Resolved::Server(id),
        }
    }

    async fn persist_entries(&self) -> Result<(), ClientError> {
        let json = serde_json::to_string(&self.entries)?;
        self.storage.store(constants::CACHE_ENTRIES_KEY, &json).await
    }

    async fn persist_outbox(&self) -> Result<(), ClientError> {
        let json = serde_json::to_string(&self.outbox)?;
        self.storage.store(constants::CACHE_OUTBOX_KEY, &json).await
    }

    async fn persist_id_map(&self) -> Result<(), ClientError> {
        let json = serde_json::to_string(&self.id_map)?;
        self.storage.store(constants::CACHE_ID_MAP_KEY, &json).await
    }

    /// Overwrites the list with pending entries followed by the fresh server
    /// listing, and drops id mappings whose server entry is gone.
    pub async fn replace_with_server(&mut self, server: &[Entry]) -> Result<(), ClientError> {
        let mut next: Vec<CachedEntry> = self
            .entries
            .iter()
            .filter(|e| e.is_pending)
            .cloned()
            .collect();
        next.extend(server.iter().map(CachedEntry::from_server));
        self.entries = next;
        self.persist_entries().await?;

        let before = self.id_map.len();
        self.id_map
            .retain(|_, id| server.iter().any(|entry| entry.id == *id));
        if self.id_map.len() != before {
            tracing::debug!(pruned = before - self.id_map.len(), "pruned id mappings");
            self.persist_id_map().await?;
        }
        Ok(())
    }

    /// Adds a creation made while offline, newest first. The local uuid doubles
    /// as the idempotency token sent on replay.
    pub async fn insert_pending(&mut self, fields: EntryFields) -> Result<Uuid, ClientError> {
        let local = Uuid::new_v4();
        self.entries.insert(0, CachedEntry::pending(local, fields));
        self.persist_entries().await?;
        Ok(local)
    }

    /// Records an entry the server just created while online.
    pub async fn insert_server(&mut self, id: i32, fields: EntryFields, token: Option<String>) -> Result<(), ClientError> {
        let mut fields = fields;
        fields.status.get_or_insert(EntryStatus::Estoque);
        self.entries.retain(|e| e.id != EntryKey::Server(id));
        self.entries.insert(
            0,
            CachedEntry {
                id: EntryKey::Server(id),
                fields,
                created_at: Some(Utc::now().naive_utc()),
                client_token: token,
                is_pending: false,
            },
        );
        self.persist_entries().await
    }

    /// Merges `changes` into the cached copy only.
    pub async fn apply_local(&mut self, key: EntryKey, changes: &EntryFields) -> Result<(), ClientError> {
        let key = self.resolve_key(key);
        let index = self
            .position(key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        self.entries[index].fields.merge(changes);
        self.persist_entries().await
    }

    /// Queues an update of a server entry for replay.
    pub async fn queue_update(&mut self, id: i32, changes: EntryFields) -> Result<(), ClientError> {
        self.outbox.push(QueuedUpdate {
            op_id: Uuid::new_v4(),
            id,
            changes,
            queued_at: Utc::now(),
        });
        self.persist_outbox().await
    }

    pub async fn dequeue(&mut self, op_id: Uuid) -> Result<(), ClientError> {
        self.outbox.retain(|op| op.op_id != op_id);
        self.persist_outbox().await
    }

    /// Removes an entry and any updates queued for it.
    pub async fn remove(&mut self, key: EntryKey) -> Result<Option<CachedEntry>, ClientError> {
        let key = self.resolve_key(key);
        let Some(index) = self.position(key) else {
            return Ok(None);
        };
        let removed = self.entries.remove(index);
        self.persist_entries().await?;

        if let EntryKey::Server(id) = key {
            let before = self.outbox.len();
            self.outbox.retain(|op| op.id != id);
            if self.outbox.len() != before {
                self.persist_outbox().await?;
            }
        }
        Ok(Some(removed))
    }

    /// Pending creations, oldest first, so replay preserves creation order.
    pub fn pending_drafts(&self) -> Vec<PendingDraft> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.is_pending)
            .filter_map(|e| match e.id {
                EntryKey::Local(local) => Some(PendingDraft {
                    local,
                    fields: e.fields.clone(),
                    client_token: e.client_token.clone().unwrap_or_else(|| local.to_string()),
                }),
                EntryKey::Server(_) => None,
            })
            .collect()
    }

    /// Rewrites a pending entry to the id the server assigned.
    ///
    /// `sent` is the draft as it was sent; edits made since then are queued as
    /// an update of the new server entry. Returns whether such an update was queued.
    pub async fn mark_synced(&mut self, local: Uuid, id: i32, sent: &EntryFields) -> Result<bool, ClientError> {
        self.id_map.insert(local, id);
        self.persist_id_map().await?;

        let Some(index) = self.position(EntryKey::Local(local)) else {
            tracing::warn!(%local, id, "synced draft no longer in cache");
            return Ok(false);
        };
        let entry = &mut self.entries[index];
        entry.id = EntryKey::Server(id);
        entry.is_pending = false;
        let edits = entry.fields.diff_from(sent);
        self.persist_entries().await?;

        if edits.is_empty() {
            return Ok(false);
        }
        self.queue_update(id, edits).await?;
        Ok(true)
    }

    /// Replaces every cached entry (backup import). Pending state is derived
    /// from the key.
    pub async fn replace_all(&mut self, entries: Vec<CachedEntry>) -> Result<(), ClientError> {
        self.entries = entries
            .into_iter()
            .map(|mut e| {
                e.is_pending = e.id.is_local();
                if e.is_pending && e.client_token.is_none() {
                    if let EntryKey::Local(local) = e.id {
                        e.client_token = Some(local.to_string());
                    }
                }
                e
            })
            .collect();
        self.persist_entries().await
    }
}
