//! Entry Service - QueryReaders for the shipment ledger
//!
//! Validation happens when a reader is built, so an invalid request never
//! reaches the blocking pool.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    constants,
    error::{ServiceError, ServiceResult},
    models::entry::{
        operations as entry_ops, validators as entry_validators, Entry, EntryChangeset,
        EntryFields, EntryFilter,
    },
    services::functional_patterns::QueryReader,
};

/// Body of `POST /api/entries`: the entry fields plus an optional idempotency token.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct CreateEntryRequest {
    #[serde(flatten)]
    pub fields: EntryFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

/// Reads a partial update body.
///
/// Keys must be editable columns; `id`, `created_at` and anything unknown is
/// rejected instead of silently ignored. `null` or `""` clears a column.
pub fn parse_update(body: Map<String, Value>) -> ServiceResult<EntryChangeset> {
    if body.is_empty() {
        return Err(ServiceError::bad_request(constants::MESSAGE_NO_UPDATES));
    }
    if let Some(key) = body
        .keys()
        .find(|key| !EntryFields::COLUMNS.contains(&key.as_str()))
    {
        return Err(ServiceError::bad_request(format!("Field '{}' cannot be updated", key))
            .with_tag("entry"));
    }
    serde_json::from_value::<EntryChangeset>(Value::Object(body)).map_err(|e| {
        ServiceError::bad_request(format!("{}: {}", constants::MESSAGE_INVALID_BODY, e))
            .with_tag("entry")
    })
}

/// Build a QueryReader for the entry listing, newest first
pub fn list_entries_reader(filter: EntryFilter) -> QueryReader<Vec<Entry>> {
    QueryReader::new(move |conn| {
        entry_ops::list_entries(&filter, conn).map_err(|e| e.with_tag("entry"))
    })
}

/// Build a QueryReader for creating an entry, deduplicated by client token
pub fn create_entry_reader(request: CreateEntryRequest) -> ServiceResult<QueryReader<i32>> {
    entry_validators::validate_new_entry(&request.fields)?;

    let CreateEntryRequest {
        fields,
        client_token,
    } = request;
    let client_token = client_token.filter(|t| !t.trim().is_empty());

    Ok(QueryReader::new(move |conn| {
        entry_ops::create_entry_once(fields.clone(), client_token.clone(), conn)
    })
    .transaction())
}

/// Build a QueryReader for a partial update. Updating an id that does not
/// exist is a `NotFound`.
pub fn update_entry_reader(entry_id: i32, changes: EntryChangeset) -> ServiceResult<QueryReader<()>> {
    entry_validators::validate_update_entry(&changes)?;

    Ok(QueryReader::new(move |conn| {
        match entry_ops::update_entry(entry_id, &changes, conn)? {
            0 => Err(
                ServiceError::not_found(format!("Entry with id {} not found", entry_id))
                    .with_tag("entry"),
            ),
            _ => Ok(()),
        }
    }))
}

/// Build a QueryReader for deleting an entry; yields the number of removed rows
pub fn delete_entry_reader(entry_id: i32) -> QueryReader<usize> {
    QueryReader::new(move |conn| entry_ops::delete_entry(entry_id, conn))
}
