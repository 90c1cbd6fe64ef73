//! Store operations for shipment entries.
//!
//! Plain functions over a borrowed connection; services wrap them in
//! `QueryReader`s and decide on transactions.

use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind};

use crate::{
    config::db::Connection,
    error::ServiceError,
    models::entry::{Entry, EntryChangeset, EntryFields, EntryFilter, EntryStatus},
    schema::entries::dsl::*,
};

fn storage_error(action: &str, err: diesel::result::Error) -> ServiceError {
    log::error!("Failed to {} entry: {}", action, err);
    let service_error = match &err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::CheckViolation, info)
        | diesel::result::Error::DatabaseError(DatabaseErrorKind::NotNullViolation, info) => {
            ServiceError::bad_request(info.message().to_string())
        }
        _ => ServiceError::storage(err.to_string()),
    };
    service_error.with_context(|ctx| ctx.with_tag("entry").with_detail(action.to_string()))
}

/// Every entry, newest first. Ties on `created_at` (same second) fall back to
/// the id so the order is stable.
pub fn list_entries(filter: &EntryFilter, conn: &mut Connection) -> Result<Vec<Entry>, ServiceError> {
    let mut query = entries.into_boxed();
    if let Some(start) = filter.start {
        query = query.filter(data_nf.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(data_nf.le(end));
    }

    let rows = query
        .order((created_at.desc(), id.desc()))
        .load::<Entry>(conn)
        .map_err(|err| storage_error("list", err))?;

    if filter.fornecedor.is_none() {
        return Ok(rows);
    }
    Ok(rows
        .into_iter()
        .filter(|entry| filter.matches(entry.data_nf, entry.fornecedor.as_deref()))
        .collect())
}

/// Looks up the id an earlier create with the same idempotency token produced.
pub fn find_id_by_token(token: &str, conn: &mut Connection) -> Result<Option<i32>, ServiceError> {
    entries
        .filter(client_token.eq(token))
        .select(id)
        .first::<i32>(conn)
        .optional()
        .map_err(|err| storage_error("look up", err))
}

/// Inserts a new entry and returns its id.
///
/// A missing status is stored as `Estoque`. `created_at` is assigned here so
/// every row carries a UTC timestamp regardless of the database clock.
pub fn create_entry(
    mut fields: EntryFields,
    token: Option<String>,
    conn: &mut Connection,
) -> Result<i32, ServiceError> {
    fields.status.get_or_insert(EntryStatus::Estoque);

    diesel::insert_into(entries)
        .values((
            &fields,
            client_token.eq(token),
            created_at.eq(Utc::now().naive_utc()),
        ))
        .returning(id)
        .get_result::<i32>(conn)
        .map_err(|err| storage_error("create", err))
}

/// Creates an entry unless `token` was already used, in which case the id of
/// the earlier entry is returned and nothing is written.
pub fn create_entry_once(
    fields: EntryFields,
    token: Option<String>,
    conn: &mut Connection,
) -> Result<i32, ServiceError> {
    if let Some(existing) = token
        .as_deref()
        .map(|t| find_id_by_token(t, conn))
        .transpose()?
        .flatten()
    {
        log::info!("Entry {} already created for this client token", existing);
        return Ok(existing);
    }
    create_entry(fields, token, conn)
}

/// Applies a changeset to one entry; cleared columns become `NULL`.
/// Returns the affected row count.
pub fn update_entry(
    entry_id: i32,
    changes: &EntryChangeset,
    conn: &mut Connection,
) -> Result<usize, ServiceError> {
    diesel::update(entries.find(entry_id))
        .set(changes)
        .execute(conn)
        .map_err(|err| storage_error("update", err).with_metadata("id", entry_id))
}

/// Deletes one entry. Returns the affected row count, zero when it did not exist.
pub fn delete_entry(entry_id: i32, conn: &mut Connection) -> Result<usize, ServiceError> {
    diesel::delete(entries.find(entry_id))
        .execute(conn)
        .map_err(|err| storage_error("delete", err).with_metadata("id", entry_id))
}

pub fn find_entry_by_id(entry_id: i32, conn: &mut Connection) -> Result<Entry, ServiceError> {
    entries
        .find(entry_id)
        .select(Entry::as_select())
        .first::<Entry>(conn)
        .map_err(|err| match err {
            diesel::result::Error::NotFound => {
                ServiceError::not_found(format!("Entry with id {} not found", entry_id))
                    .with_tag("entry")
            }
            _ => storage_error("find", err),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::db::{init_store, Pool};
    use chrono::NaiveDate;

    fn test_pool() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("stock.db");
        let pool = init_store(&url.to_string_lossy(), 1).unwrap();
        (dir, pool)
    }

    fn supplier(name: &str, date: Option<NaiveDate>) -> EntryFields {
        EntryFields {
            fornecedor: Some(name.to_string()),
            data_nf: date,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_defaults_status_and_lists_newest_first() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let first = create_entry(supplier("ACME", None), None, &mut conn).unwrap();
        let second = create_entry(supplier("Beta", None), None, &mut conn).unwrap();
        assert!(second > first);

        let rows = list_entries(&EntryFilter::default(), &mut conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second);
        assert_eq!(rows[1].id, first);
        assert_eq!(rows[1].status, EntryStatus::Estoque);
        assert_eq!(rows[1].fornecedor.as_deref(), Some("ACME"));
        assert_eq!(rows[1].tonelada, None);
    }

    #[test]
    fn test_create_entry_once_reuses_token() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let token = Some("tok-1".to_string());
        let a = create_entry_once(supplier("ACME", None), token.clone(), &mut conn).unwrap();
        let b = create_entry_once(supplier("ACME", None), token, &mut conn).unwrap();
        assert_eq!(a, b);
        assert_eq!(list_entries(&EntryFilter::default(), &mut conn).unwrap().len(), 1);
    }

    #[test]
    fn test_update_only_touches_provided_fields() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let mut fields = supplier("ACME", None);
        fields.tonelada = Some(30.0);
        let entry_id = create_entry(fields, None, &mut conn).unwrap();

        let changes = EntryChangeset {
            status: Some(EntryStatus::Embarcado),
            ..Default::default()
        };
        assert_eq!(update_entry(entry_id, &changes, &mut conn).unwrap(), 1);

        let stored = find_entry_by_id(entry_id, &mut conn).unwrap();
        assert_eq!(stored.status, EntryStatus::Embarcado);
        assert_eq!(stored.tonelada, Some(30.0));
        assert_eq!(stored.fornecedor.as_deref(), Some("ACME"));

        assert_eq!(update_entry(9999, &changes, &mut conn).unwrap(), 0);
    }

    #[test]
    fn test_update_clears_columns_set_to_none() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let mut fields = supplier("ACME", NaiveDate::from_ymd_opt(2024, 1, 5));
        fields.cte_vli = Some("CTE-1".to_string());
        fields.tonelada = Some(12.0);
        let entry_id = create_entry(fields, None, &mut conn).unwrap();

        let changes = EntryChangeset {
            data_nf: Some(None),
            cte_vli: Some(None),
            ..Default::default()
        };
        assert_eq!(update_entry(entry_id, &changes, &mut conn).unwrap(), 1);

        let stored = find_entry_by_id(entry_id, &mut conn).unwrap();
        assert_eq!(stored.data_nf, None);
        assert_eq!(stored.cte_vli, None);
        assert_eq!(stored.tonelada, Some(12.0));
        assert_eq!(stored.fornecedor.as_deref(), Some("ACME"));
    }

    #[test]
    fn test_delete_reports_changes() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let entry_id = create_entry(supplier("ACME", None), None, &mut conn).unwrap();
        assert_eq!(delete_entry(entry_id, &mut conn).unwrap(), 1);
        assert_eq!(delete_entry(entry_id, &mut conn).unwrap(), 0);
        assert!(matches!(
            find_entry_by_id(entry_id, &mut conn),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_filters_by_date_and_supplier() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();

        let jan = NaiveDate::from_ymd_opt(2024, 1, 10);
        let feb = NaiveDate::from_ymd_opt(2024, 2, 10);
        create_entry(supplier("Mineração Norte", jan), None, &mut conn).unwrap();
        create_entry(supplier("ACME", feb), None, &mut conn).unwrap();
        create_entry(supplier("acme sul", None), None, &mut conn).unwrap();

        let by_date = EntryFilter {
            start: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..Default::default()
        };
        let rows = list_entries(&by_date, &mut conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fornecedor.as_deref(), Some("ACME"));

        let by_supplier = EntryFilter {
            fornecedor: Some("AcMe".to_string()),
            ..Default::default()
        };
        assert_eq!(list_entries(&by_supplier, &mut conn).unwrap().len(), 2);
    }
}
