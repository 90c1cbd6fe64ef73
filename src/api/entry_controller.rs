use actix_web::{web, HttpResponse};
use log::info;
use serde_json::{json, Map, Value};

use crate::{
    api::controller_context::DatabaseContext,
    config::db::Pool,
    error::ServiceError,
    models::entry::{CreatedEntry, DeletedEntry, EntryFilter},
    services::{
        entry_service::{self, CreateEntryRequest},
        functional_patterns::FunctionalErrorHandling,
    },
};

// GET api/entries
pub async fn list(
    filter: web::Query<EntryFilter>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServiceError> {
    let filter = filter.into_inner();
    if !filter.is_empty() {
        info!("Listing entries with filter {}", filter);
    }
    let entries = DatabaseContext::from_data(&pool)
        .execute(entry_service::list_entries_reader(filter))
        .await
        .log_error("entry_controller::list")?;
    Ok(HttpResponse::Ok().json(entries))
}

// POST api/entries
pub async fn create(
    request: web::Json<CreateEntryRequest>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServiceError> {
    let reader = entry_service::create_entry_reader(request.into_inner())?;
    let id = DatabaseContext::from_data(&pool)
        .execute(reader)
        .await
        .log_error("entry_controller::create")?;
    info!("Created entry {}", id);
    Ok(HttpResponse::Ok().json(CreatedEntry { id }))
}

// PUT api/entries/{id}
pub async fn update(
    path: web::Path<i32>,
    body: web::Json<Map<String, Value>>,
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    let changes = entry_service::parse_update(body.into_inner())
        .map_err(|e| e.with_metadata("id", id))?;
    let reader = entry_service::update_entry_reader(id, changes)?;
    DatabaseContext::from_data(&pool).execute(reader).await?;
    info!("Updated entry {}", id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

// DELETE api/entries/{id}
pub async fn delete(path: web::Path<i32>, pool: web::Data<Pool>) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    let changes = DatabaseContext::from_data(&pool)
        .execute(entry_service::delete_entry_reader(id))
        .await
        .log_error("entry_controller::delete")?;
    info!("Deleted entry {} ({} row(s))", id, changes);
    Ok(HttpResponse::Ok().json(DeletedEntry { changes }))
}
