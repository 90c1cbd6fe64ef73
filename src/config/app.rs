use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_files::{Files, NamedFile};
use actix_web::{
    dev::{fn_service, ServiceRequest, ServiceResponse},
    web,
};

use crate::{
    api::{
        entry_controller, extraction_controller, fallback_controller, health_controller,
        stock_controller,
    },
    config::db::Pool,
    constants,
    services::extraction_service::{ExtractionConfig, InvoiceExtractor},
    utils::logging::{LogFormat, LoggingConfig},
};

/// Where the process runs. Serverless platforms only offer a writable `/tmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Local,
    Serverless,
}

impl DeploymentMode {
    pub fn from_env() -> Self {
        let explicit = env::var("STOCKPRO_DEPLOYMENT")
            .map(|v| v.eq_ignore_ascii_case(constants::ENV_SERVERLESS))
            .unwrap_or(false);
        if explicit || env::var_os("VERCEL").is_some() {
            DeploymentMode::Serverless
        } else {
            DeploymentMode::Local
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeploymentMode::Local => constants::ENV_LOCAL,
            DeploymentMode::Serverless => constants::ENV_SERVERLESS,
        }
    }

    /// Directory for the database and log files when no explicit path is configured.
    pub fn data_dir(&self) -> PathBuf {
        match self {
            DeploymentMode::Local => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            DeploymentMode::Serverless => PathBuf::from(constants::SERVERLESS_DATA_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub deployment: DeploymentMode,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_pool_size: u32,
    pub static_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub logging: LoggingConfig,
    pub extraction: ExtractionConfig,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Self {
        let deployment = DeploymentMode::from_env();
        let data_dir = deployment.data_dir();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            data_dir
                .join(constants::DEFAULT_DATABASE_FILE)
                .to_string_lossy()
                .into_owned()
        });

        let log_file = env::var("LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(constants::DEFAULT_LOG_FILE));

        AppConfig {
            deployment,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url,
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dist")),
            allowed_origins: allowed_origins_from(env::var("CORS_ALLOWED_ORIGINS").ok()),
            logging: LoggingConfig {
                format: LogFormat::from_env_or_default(),
                file: Some(log_file),
            },
            extraction: ExtractionConfig::from_env(),
        }
    }
}

/// Parse a comma-separated origin allowlist, falling back to the usual dev origins.
pub fn allowed_origins_from(raw: Option<String>) -> Vec<String> {
    let configured: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if configured.is_empty() {
        vec![
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
            "http://127.0.0.1:3000".to_string(),
            "http://127.0.0.1:5173".to_string(),
        ]
    } else {
        configured
    }
}

/// Everything the handlers need, registered as app data.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub deployment: DeploymentMode,
    pub extractor: Arc<dyn InvoiceExtractor>,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(pool: Pool, deployment: DeploymentMode, extractor: Arc<dyn InvoiceExtractor>) -> Self {
        Self {
            pool,
            deployment,
            extractor,
            static_dir: None,
        }
    }

    /// Serve the compiled front-end from `dir` if it exists.
    pub fn with_static_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if dir.is_dir() {
            self.static_dir = Some(dir.to_path_buf());
        } else {
            log::warn!(
                "Static directory {} not found; front-end assets will not be served",
                dir.display()
            );
        }
        self
    }
}

/// Register app data and all routes. Used by `main` and by the HTTP tests.
pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(state.pool.clone()))
            .app_data(web::Data::new(state.deployment))
            .app_data(web::Data::from(state.extractor.clone()))
            .app_data(web::JsonConfig::default().error_handler(fallback_controller::json_error))
            .app_data(web::PathConfig::default().error_handler(fallback_controller::path_error))
            .app_data(web::QueryConfig::default().error_handler(fallback_controller::query_error));

        config_services(cfg);

        match state.static_dir {
            Some(dir) => {
                let index = dir.join("index.html");
                cfg.service(
                    Files::new("/", dir)
                        .index_file("index.html")
                        .default_handler(fn_service(move |req: ServiceRequest| {
                            let index = index.clone();
                            async move {
                                let (req, _) = req.into_parts();
                                let file = NamedFile::open_async(&index).await?;
                                let res = file.into_response(&req);
                                Ok(ServiceResponse::new(req, res))
                            }
                        })),
                );
            }
            None => {
                cfg.default_service(web::route().to(fallback_controller::not_found));
            }
        }
    }
}

pub fn config_services(cfg: &mut web::ServiceConfig) {
    log::info!("Configuring routes...");
    cfg.service(
        web::scope("/api")
            .service(web::resource("/health").route(web::get().to(health_controller::health)))
            .service(
                web::resource("/entries")
                    .route(web::get().to(entry_controller::list))
                    .route(web::post().to(entry_controller::create)),
            )
            .service(
                web::resource("/entries/{id}")
                    .route(web::put().to(entry_controller::update))
                    .route(web::delete().to(entry_controller::delete)),
            )
            .service(
                web::resource("/stock-summary")
                    .route(web::get().to(stock_controller::stock_summary)),
            )
            .service(
                web::resource("/stock-by-product-destination")
                    .route(web::get().to(stock_controller::stock_by_product_destination)),
            )
            .service(
                web::resource("/daily-performance")
                    .route(web::get().to(stock_controller::daily_performance)),
            )
            .service(
                web::resource("/parse-nfe")
                    .route(web::post().to(extraction_controller::parse_nfe)),
            )
            .default_service(web::route().to(fallback_controller::api_not_found)),
    );
}
