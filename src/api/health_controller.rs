use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use crate::config::{app::DeploymentMode, db::Pool as DatabasePool};
use crate::constants;
use crate::error::ServiceError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    pub env: String,
}

fn check_database_health(
    pool: web::Data<DatabasePool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut conn = pool.get()?;
    diesel::sql_query("SELECT 1").execute(&mut conn)?;
    Ok(())
}

/// Run the probe on the blocking pool; a pool that is busy past the timeout
/// counts as unavailable.
async fn check_database_health_async(pool: web::Data<DatabasePool>) -> bool {
    match timeout(
        Duration::from_secs(5),
        web::block(move || check_database_health(pool)),
    )
    .await
    {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            error!("Database health check failed: {}", e);
            false
        }
        Ok(Err(e)) => {
            error!("Database health check could not run: {}", e);
            false
        }
        Err(_) => {
            error!("Database health check timeout");
            false
        }
    }
}

/// Liveness probe used by the offline client. Always 200: the process is up
/// even when the store is not.
pub async fn health(
    pool: web::Data<DatabasePool>,
    deployment: web::Data<DeploymentMode>,
) -> Result<HttpResponse, ServiceError> {
    info!("Health check hit");
    let database = check_database_health_async(pool).await;

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: constants::MESSAGE_OK.to_string(),
        database,
        env: deployment.label().to_string(),
    }))
}
