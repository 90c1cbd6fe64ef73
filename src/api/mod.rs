pub mod controller_context;
pub mod entry_controller;
pub mod extraction_controller;
pub mod fallback_controller;
pub mod health_controller;
pub mod stock_controller;
