pub mod entry_service;
pub mod extraction_service;
pub mod functional_patterns;
pub mod stock_service;
