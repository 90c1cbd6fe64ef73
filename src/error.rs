//! Service error type shared by the store, the services and the HTTP layer.
//!
//! Every failure surfaced to an HTTP caller is a [`ServiceError`]. The variant
//! decides the status code, the message becomes the `{"error": ...}` body, and
//! the attached [`ErrorContext`] is only ever written to the log.

use std::collections::BTreeMap;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::constants;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Diagnostic context carried alongside an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    tags: Vec<String>,
    detail: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.detail.is_none() && self.metadata.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed caller input (400).
    #[error("{error_message}")]
    Validation {
        error_message: String,
        context: ErrorContext,
    },

    /// Unknown route or missing row (404).
    #[error("{error_message}")]
    NotFound {
        error_message: String,
        context: ErrorContext,
    },

    /// Any failure of the entry store; the message is surfaced to the caller (500).
    #[error("{error_message}")]
    Storage {
        error_message: String,
        context: ErrorContext,
    },

    /// AI gateway failure or unparsable model output (500, generic message).
    #[error("{error_message}")]
    Extraction {
        error_message: String,
        context: ErrorContext,
    },

    #[error("{error_message}")]
    Internal {
        error_message: String,
        context: ErrorContext,
    },
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Validation {
            error_message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            error_message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            error_message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            error_message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::Internal {
            error_message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation { error_message, .. }
            | Self::NotFound { error_message, .. }
            | Self::Storage { error_message, .. }
            | Self::Extraction { error_message, .. }
            | Self::Internal { error_message, .. } => error_message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::NotFound { context, .. }
            | Self::Storage { context, .. }
            | Self::Extraction { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::NotFound { context, .. }
            | Self::Storage { context, .. }
            | Self::Extraction { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    /// Transform the attached context.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ErrorContext) -> ErrorContext,
    {
        let context = std::mem::take(self.context_mut());
        *self.context_mut() = f(context);
        self
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.with_context(|ctx| ctx.with_tag(tag))
    }

    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        self.with_context(|ctx| ctx.with_detail(detail))
    }

    pub fn with_metadata(self, key: impl Into<String>, value: impl ToString) -> Self {
        self.with_context(|ctx| ctx.with_metadata(key, value))
    }

    fn log(&self) {
        let status = self.status_code();
        if self.context().is_empty() {
            if status.is_server_error() {
                log::error!("{} {}", status.as_u16(), self.message());
            } else {
                log::warn!("{} {}", status.as_u16(), self.message());
            }
            return;
        }

        if status.is_server_error() {
            log::error!(
                "{} {} context={:?}",
                status.as_u16(),
                self.message(),
                self.context()
            );
        } else {
            log::warn!(
                "{} {} context={:?}",
                status.as_u16(),
                self.message(),
                self.context()
            );
        }
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        ServiceError::storage(err.to_string())
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Storage { .. } | Self::Extraction { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        let message = match self {
            Self::Internal { error_message, .. } if error_message.is_empty() => {
                constants::MESSAGE_INTERNAL_SERVER_ERROR
            }
            _ => self.message(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
