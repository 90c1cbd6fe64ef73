use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{http, App, HttpServer};
use tracing_actix_web::TracingLogger;

use stockpro::{
    config::{
        app::{configure, AppConfig, AppState},
        db,
    },
    middleware::error_handlers::json_error_handlers,
    services::extraction_service::{GeminiExtractor, InvoiceExtractor},
    utils::logging::init_logging,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env();
    init_logging(&config.logging)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    log::info!("Starting server process ({})", config.deployment.label());

    let pool = db::init_store(&config.database_url, config.database_pool_size).map_err(|e| {
        log::error!("Database Initialization Error: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    let extractor: Arc<dyn InvoiceExtractor> =
        Arc::new(GeminiExtractor::new(config.extraction.clone()));
    let state = AppState::new(pool, config.deployment, extractor).with_static_dir(&config.static_dir);

    let allowed_origins = config.allowed_origins.clone();
    let bind = (config.host.clone(), config.port);
    log::info!("Server running on http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_header(http::header::CONTENT_TYPE)
            .max_age(3600);

        App::new()
            .wrap(json_error_handlers())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure(state.clone()))
    })
    .workers(num_cpus::get())
    .bind(bind)?
    .run()
    .await
}
