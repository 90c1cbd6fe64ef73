//! AI Extraction Gateway
//!
//! Sends pasted invoice text (or NF-e XML) to a generative model constrained
//! to a fixed JSON schema and forwards whatever object comes back.

use std::{env, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{constants, error::{ServiceError, ServiceResult}};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const RESPONSE_LIMIT: usize = 4 * 1024 * 1024;

thread_local! {
    // awc clients are not Send; each worker thread keeps its own pooled client.
    static HTTP_CLIENT: awc::Client = awc::Client::builder().timeout(REQUEST_TIMEOUT).finish();
}

/// Anything able to turn invoice text into the extraction object.
///
/// Handlers hold it as `web::Data<dyn InvoiceExtractor>`, so tests can plug a stub.
#[async_trait(?Send)]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(&self, content: &str) -> ServiceResult<Value>;
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_url: DEFAULT_GEMINI_API_URL.to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            api_url: env::var("GEMINI_API_URL").unwrap_or(defaults.api_url),
        }
    }
}

/// The object shape the model must produce.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "chave_acesso": { "type": "STRING" },
            "nf_numero": { "type": "STRING" },
            "valor": { "type": "NUMBER" },
            "data_nf": { "type": "STRING" },
            "fornecedor": { "type": "STRING" },
            "descricao_produto": { "type": "STRING" },
            "tonelada": { "type": "NUMBER" }
        },
        "required": [
            "chave_acesso",
            "nf_numero",
            "valor",
            "data_nf",
            "fornecedor",
            "descricao_produto"
        ]
    })
}

fn prompt(content: &str) -> String {
    format!(
        "Leia a Nota Fiscal abaixo (texto livre ou XML de NF-e) e devolva: \
         chave de acesso, número da NF, valor total, data de emissão no formato YYYY-MM-DD, \
         fornecedor (emitente), descrição do produto e peso em toneladas \
         (use 0 quando a nota não informar).\n\nNota Fiscal:\n{}",
        content
    )
}

/// Reads the first candidate's text out of a `generateContent` response.
/// A missing or empty text counts as an empty object.
pub fn parse_generate_content(response: &Value) -> ServiceResult<Value> {
    let text = response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("{}");

    serde_json::from_str::<Value>(text).map_err(|e| {
        ServiceError::extraction(constants::MESSAGE_PARSE_NFE_FAILED)
            .with_tag("extraction")
            .with_detail(format!("model returned invalid JSON: {}", e))
    })
}

/// Google Generative Language REST client.
#[derive(Debug, Clone)]
pub struct GeminiExtractor {
    config: ExtractionConfig,
}

impl GeminiExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        if config.api_key.is_none() {
            log::warn!("GEMINI_API_KEY is not set; invoice extraction will fail");
        }
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn failure(detail: impl Into<String>) -> ServiceError {
        ServiceError::extraction(constants::MESSAGE_PARSE_NFE_FAILED)
            .with_tag("extraction")
            .with_detail(detail)
    }
}

#[async_trait(?Send)]
impl InvoiceExtractor for GeminiExtractor {
    async fn extract(&self, content: &str) -> ServiceResult<Value> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Self::failure("GEMINI_API_KEY is not configured"))?;

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt(content) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema()
            }
        });

        let request = HTTP_CLIENT.with(|client| {
            client
                .post(self.endpoint())
                .insert_header(("x-goog-api-key", api_key))
        });
        let mut response = request
            .send_json(&body)
            .await
            .map_err(|e| Self::failure(format!("request failed: {}", e)))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .limit(RESPONSE_LIMIT)
            .await
            .map_err(|e| Self::failure(format!("unreadable response ({}): {}", status, e)))?;

        if !status.is_success() {
            return Err(Self::failure(format!("model API returned {}", status))
                .with_metadata("model", &self.config.model)
                .with_metadata("body", payload));
        }

        log::info!("Invoice extracted with {}", self.config.model);
        parse_generate_content(&payload)
    }
}
