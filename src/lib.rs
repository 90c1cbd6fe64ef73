//! StockPro: a single-warehouse shipment ledger.
//!
//! The server half (`api`, `services`, `models`, `config`) stores entries in
//! SQLite and serves them over HTTP. The `client` half keeps an offline-first
//! mirror of the ledger and reconciles it with the server.

pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;
