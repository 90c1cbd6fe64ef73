use actix_web::web;

use crate::{
    config::db::Pool,
    error::ServiceError,
    services::functional_patterns::{run_query, QueryReader},
};

/// Store access for handlers. Readers run on the blocking thread pool so a
/// slow SQLite lock never stalls an actix worker.
#[derive(Clone)]
pub struct DatabaseContext {
    pool: Pool,
}

impl DatabaseContext {
    pub fn with_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_data(pool: &web::Data<Pool>) -> Self {
        Self::with_pool(pool.get_ref().clone())
    }

    pub async fn execute<T>(&self, reader: QueryReader<T>) -> Result<T, ServiceError>
    where
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        web::block(move || run_query(reader, &pool))
            .await
            .map_err(|e| {
                ServiceError::internal_server_error(format!("Blocking task failed: {}", e))
                    .with_tag("database")
            })?
    }
}
