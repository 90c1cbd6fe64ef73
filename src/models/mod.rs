pub mod entry;
pub mod extraction;
pub mod stock_summary;
