use actix_web::{web, HttpResponse};
use log::info;

use crate::{
    constants,
    error::ServiceError,
    models::extraction::ParseInvoiceRequest,
    services::extraction_service::InvoiceExtractor,
};

// POST api/parse-nfe
pub async fn parse_nfe(
    request: web::Json<ParseInvoiceRequest>,
    extractor: web::Data<dyn InvoiceExtractor>,
) -> Result<HttpResponse, ServiceError> {
    let content = request
        .content()
        .ok_or_else(|| ServiceError::bad_request(constants::MESSAGE_CONTENT_REQUIRED))?;

    info!("Extracting invoice fields from {} characters", content.chars().count());
    let extracted = extractor.extract(content).await?;
    Ok(HttpResponse::Ok().json(extracted))
}
