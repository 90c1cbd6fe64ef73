use actix_web::{web, HttpResponse};

use crate::{
    api::controller_context::DatabaseContext,
    config::db::Pool,
    error::ServiceError,
    services::{functional_patterns::FunctionalErrorHandling, stock_service},
};

// GET api/stock-summary
pub async fn stock_summary(pool: web::Data<Pool>) -> Result<HttpResponse, ServiceError> {
    let summary = DatabaseContext::from_data(&pool)
        .execute(stock_service::stock_by_supplier_reader())
        .await
        .log_error("stock_controller::stock_summary")?;
    Ok(HttpResponse::Ok().json(summary))
}

// GET api/stock-by-product-destination
pub async fn stock_by_product_destination(
    pool: web::Data<Pool>,
) -> Result<HttpResponse, ServiceError> {
    let summary = DatabaseContext::from_data(&pool)
        .execute(stock_service::stock_by_product_destination_reader())
        .await
        .log_error("stock_controller::stock_by_product_destination")?;
    Ok(HttpResponse::Ok().json(summary))
}

// GET api/daily-performance
pub async fn daily_performance(pool: web::Data<Pool>) -> Result<HttpResponse, ServiceError> {
    let days = DatabaseContext::from_data(&pool)
        .execute(stock_service::daily_performance_reader())
        .await
        .log_error("stock_controller::daily_performance")?;
    Ok(HttpResponse::Ok().json(days))
}
