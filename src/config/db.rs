use std::time::Duration;

use diesel::{
    connection::SimpleConnection,
    r2d2::{self, ConnectionManager, CustomizeConnection},
    sqlite::SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::ServiceError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type Connection = SqliteConnection;
pub type Pool = r2d2::Pool<ConnectionManager<Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Applies per-connection SQLite settings when the pool opens a connection.
#[derive(Debug, Clone, Copy)]
struct SqliteTuning;

impl CustomizeConnection<Connection, r2d2::Error> for SqliteTuning {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            BUSY_TIMEOUT.as_millis()
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Build the store pool for the SQLite database at `url`.
///
/// `pool_size` is clamped to at least one connection.
pub fn init_db_pool(url: &str, pool_size: u32) -> Result<Pool, ServiceError> {
    log::info!("Initializing database at: {}", url);
    let manager = ConnectionManager::<Connection>::new(url);
    Pool::builder()
        .max_size(pool_size.max(1))
        .connection_customizer(Box::new(SqliteTuning))
        .build(manager)
        .map_err(|e| {
            ServiceError::storage(format!("Failed to create database pool: {}", e))
                .with_tag("database")
                .with_metadata("url", url)
        })
}

/// Create the schema if it is absent. Safe to run on every start.
pub fn run_migration(conn: &mut Connection) -> Result<(), ServiceError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| {
            if !applied.is_empty() {
                log::info!("Applied {} database migration(s)", applied.len());
            }
        })
        .map_err(|e| {
            ServiceError::storage(format!("Database Initialization Error: {}", e))
                .with_tag("database")
        })
}

/// Build the pool and bring the schema up to date.
pub fn init_store(url: &str, pool_size: u32) -> Result<Pool, ServiceError> {
    let pool = init_db_pool(url, pool_size)?;
    let mut conn = pool.get().map_err(|e| {
        ServiceError::storage(format!("Failed to get database connection: {}", e))
            .with_tag("database")
    })?;
    run_migration(&mut conn)?;
    log::info!("Database initialized successfully");
    Ok(pool)
}
