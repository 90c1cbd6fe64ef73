//! Responses for requests no route accepts, and for bodies or paths the
//! extractors cannot read.

use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    Error, HttpRequest, HttpResponse,
};
use log::warn;

use crate::{constants, error::ServiceError};

fn request_target(req: &HttpRequest) -> String {
    match req.uri().path_and_query() {
        Some(target) => target.as_str().to_string(),
        None => req.path().to_string(),
    }
}

/// Catch-all for `/api/*`.
pub async fn api_not_found(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    warn!("API 404: {} {}", req.method(), request_target(&req));
    Err(ServiceError::not_found(format!(
        "Route {} {} not found",
        req.method(),
        request_target(&req)
    )))
}

/// Catch-all for everything else when no front-end is being served.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    Err(ServiceError::not_found(format!(
        "Route {} {} not found",
        req.method(),
        request_target(&req)
    )))
}

pub fn json_error(err: JsonPayloadError, req: &HttpRequest) -> Error {
    warn!("Rejected body for {} {}: {}", req.method(), req.path(), err);
    ServiceError::bad_request(format!("{}: {}", constants::MESSAGE_INVALID_BODY, err))
        .with_tag("request")
        .into()
}

pub fn path_error(err: PathError, req: &HttpRequest) -> Error {
    ServiceError::bad_request(format!("Invalid path parameter: {}", err))
        .with_tag("request")
        .with_metadata("path", req.path())
        .into()
}

pub fn query_error(err: QueryPayloadError, req: &HttpRequest) -> Error {
    ServiceError::bad_request(format!("Invalid query string: {}", err))
        .with_tag("request")
        .with_metadata("path", req.path())
        .into()
}
