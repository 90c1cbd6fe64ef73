//! Typed client for the StockPro HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    api::health_controller::HealthResponse,
    client::ClientError,
    models::{
        entry::{CreatedEntry, DeletedEntry, Entry, EntryFields},
        extraction::{ExtractedInvoice, ParseInvoiceRequest},
        stock_summary::{ProductDestinationStock, SupplierStock},
    },
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the reconciler needs from the server.
#[async_trait]
pub trait EntryApi: Send + Sync {
    /// Liveness probe (`GET /api/health`).
    async fn probe(&self) -> Result<HealthResponse, ClientError>;
    async fn list_entries(&self) -> Result<Vec<Entry>, ClientError>;
    async fn stock_by_supplier(&self) -> Result<Vec<SupplierStock>, ClientError>;
    async fn stock_by_product_destination(&self) -> Result<Vec<ProductDestinationStock>, ClientError>;
    /// Creates an entry. Repeating a call with the same `client_token` yields
    /// the same id without a second row.
    async fn create_entry(
        &self,
        fields: &EntryFields,
        client_token: Option<&str>,
    ) -> Result<i32, ClientError>;
    async fn update_entry(&self, id: i32, changes: &EntryFields) -> Result<(), ClientError>;
    async fn delete_entry(&self, id: i32) -> Result<usize, ClientError>;
    async fn parse_invoice(&self, content: &str) -> Result<ExtractedInvoice, ClientError>;
}

#[derive(Serialize)]
struct CreateBody<'a> {
    #[serde(flatten)]
    fields: &'a EntryFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_token: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`EntryApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpEntryApi {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpEntryApi {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Invalid(format!("invalid base url '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Invalid(format!("invalid path '{}': {}", path, e)))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(self.timeout)
                } else {
                    ClientError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        warn!(status = %status, %message, "server rejected request");
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.send(self.client.get(url)).await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl EntryApi for HttpEntryApi {
    async fn probe(&self) -> Result<HealthResponse, ClientError> {
        self.get_json("api/health").await
    }

    async fn list_entries(&self) -> Result<Vec<Entry>, ClientError> {
        self.get_json("api/entries").await
    }

    async fn stock_by_supplier(&self) -> Result<Vec<SupplierStock>, ClientError> {
        self.get_json("api/stock-summary").await
    }

    async fn stock_by_product_destination(&self) -> Result<Vec<ProductDestinationStock>, ClientError> {
        self.get_json("api/stock-by-product-destination").await
    }

    async fn create_entry(
        &self,
        fields: &EntryFields,
        client_token: Option<&str>,
    ) -> Result<i32, ClientError> {
        let url = self.endpoint("api/entries")?;
        let body = CreateBody {
            fields,
            client_token,
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let created: CreatedEntry = Self::read_json(response).await?;
        Ok(created.id)
    }

    async fn update_entry(&self, id: i32, changes: &EntryFields) -> Result<(), ClientError> {
        let url = self.endpoint(&format!("api/entries/{}", id))?;
        self.send(self.client.put(url).json(changes)).await?;
        Ok(())
    }

    async fn delete_entry(&self, id: i32) -> Result<usize, ClientError> {
        let url = self.endpoint(&format!("api/entries/{}", id))?;
        let response = self.send(self.client.delete(url)).await?;
        let deleted: DeletedEntry = Self::read_json(response).await?;
        Ok(deleted.changes)
    }

    async fn parse_invoice(&self, content: &str) -> Result<ExtractedInvoice, ClientError> {
        let url = self.endpoint("api/parse-nfe")?;
        let body = ParseInvoiceRequest {
            content: Some(content.to_string()),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Self::read_json(response).await
    }
}
