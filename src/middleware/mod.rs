pub mod error_handlers;
