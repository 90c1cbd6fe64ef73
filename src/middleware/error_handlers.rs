//! Keeps every 500 in the `{"error": ...}` shape.
//!
//! Handler errors already render as JSON through `ServiceError`; this catches
//! the rest (panicking blocking tasks, actix internals) whose body is plain text.

use actix_web::{
    dev::ServiceResponse,
    http::{header, StatusCode},
    middleware::{ErrorHandlerResponse, ErrorHandlers},
    HttpResponse, Result,
};
use serde_json::json;

use crate::constants;

fn is_json<B>(res: &ServiceResponse<B>) -> bool {
    res.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json"))
}

pub fn render_internal_error<B>(res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    if is_json(&res) {
        return Ok(ErrorHandlerResponse::Response(res.map_into_left_body()));
    }

    log::error!(
        "Unhandled error on {} {}",
        res.request().method(),
        res.request().path()
    );
    let (req, _) = res.into_parts();
    let body = HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
        .json(json!({ "error": constants::MESSAGE_INTERNAL_SERVER_ERROR }));
    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, body).map_into_right_body(),
    ))
}

pub fn json_error_handlers<B: 'static>() -> ErrorHandlers<B> {
    ErrorHandlers::new().handler(StatusCode::INTERNAL_SERVER_ERROR, render_internal_error)
}
