// Messages
pub const MESSAGE_OK: &str = "ok";
pub const MESSAGE_NO_UPDATES: &str = "No updates provided";
pub const MESSAGE_CONTENT_REQUIRED: &str = "Content is required";
pub const MESSAGE_PARSE_NFE_FAILED: &str = "Failed to parse NF-e";
pub const MESSAGE_INTERNAL_SERVER_ERROR: &str = "Internal Server Error";
pub const MESSAGE_INVALID_BODY: &str = "Invalid request body";

// Deployment labels reported by the health endpoint
pub const ENV_LOCAL: &str = "local";
pub const ENV_SERVERLESS: &str = "serverless";

// Default file names
pub const DEFAULT_DATABASE_FILE: &str = "stock.db";
pub const DEFAULT_LOG_FILE: &str = "server.log";
pub const SERVERLESS_DATA_DIR: &str = "/tmp";

// Client cache storage keys
pub const CACHE_ENTRIES_KEY: &str = "stockpro_entries";
pub const CACHE_OUTBOX_KEY: &str = "stockpro_outbox";
pub const CACHE_ID_MAP_KEY: &str = "stockpro_id_map";

// Prefix that marks client-generated identifiers
pub const LOCAL_ID_PREFIX: &str = "local-";
