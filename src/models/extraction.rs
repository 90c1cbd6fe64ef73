use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::entry::{lenient, EntryFields};

/// Body of `POST /api/parse-nfe`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ParseInvoiceRequest {
    #[serde(default)]
    pub content: Option<String>,
}

impl ParseInvoiceRequest {
    /// The pasted text, or `None` when it is missing or blank.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Fields the extraction model is asked to fill. The server forwards the
/// model's object untouched; this is the client's typed reading of it.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ExtractedInvoice {
    #[serde(default)]
    pub chave_acesso: Option<String>,
    #[serde(default)]
    pub nf_numero: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub valor: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_nf: Option<NaiveDate>,
    #[serde(default)]
    pub fornecedor: Option<String>,
    #[serde(default)]
    pub descricao_produto: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub tonelada: Option<f64>,
}

impl ExtractedInvoice {
    /// Pre-fills an entry draft. Tonnage defaults to zero when the invoice has none.
    pub fn into_fields(self) -> EntryFields {
        EntryFields {
            chave_acesso: self.chave_acesso,
            nf_numero: self.nf_numero,
            valor: self.valor,
            data_nf: self.data_nf,
            fornecedor: self.fornecedor,
            descricao_produto: self.descricao_produto,
            tonelada: Some(self.tonelada.unwrap_or(0.0)),
            ..Default::default()
        }
    }
}
