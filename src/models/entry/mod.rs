//! Entry Module
//!
//! One shipment record tracked through intake, logistics and billing stages.
//!
//! * [`Entry`] is a full row as stored and listed.
//! * [`EntryFields`] is every operator-editable column as an `Option`. It is the
//!   creation payload and the client-side draft.
//! * [`EntryChangeset`] is a partial update, able to clear a column.

use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use derive_more::Display;
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::entries;

pub mod lenient;
pub mod operations;
pub mod validators;

/// Where an entry sits in the warehouse flow.
///
/// Displayed, serialized and stored under the variant name.
#[derive(
    Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
pub enum EntryStatus {
    #[default]
    Estoque,
    Rejeitado,
    Embarcado,
    Devolvido,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 4] = [
        EntryStatus::Estoque,
        EntryStatus::Rejeitado,
        EntryStatus::Embarcado,
        EntryStatus::Devolvido,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Estoque => "Estoque",
            EntryStatus::Rejeitado => "Rejeitado",
            EntryStatus::Embarcado => "Embarcado",
            EntryStatus::Devolvido => "Devolvido",
        }
    }

    /// Still physically in the warehouse (rejected loads wait for pickup).
    pub fn is_in_stock(&self) -> bool {
        matches!(self, EntryStatus::Estoque | EntryStatus::Rejeitado)
    }

    /// Left the warehouse, shipped or returned.
    pub fn is_exited(&self) -> bool {
        matches!(self, EntryStatus::Embarcado | EntryStatus::Devolvido)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}' (expected one of Estoque, Rejeitado, Embarcado, Devolvido)")]
pub struct UnknownStatus(pub String);

impl FromStr for EntryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl ToSql<Text, Sqlite> for EntryStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for EntryStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let value = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        value.parse::<EntryStatus>().map_err(Into::into)
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Entry {
    pub id: i32,
    pub mes: Option<String>,
    pub chave_acesso: Option<String>,
    pub nf_numero: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub tonelada: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub valor: Option<f64>,
    pub descricao_produto: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_nf: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_descarga: Option<NaiveDate>,
    pub status: EntryStatus,
    pub fornecedor: Option<String>,
    pub placa_veiculo: Option<String>,
    pub container: Option<String>,
    pub destino: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_faturamento_vli: Option<NaiveDate>,
    pub cte_vli: Option<String>,
    pub numero_vagao: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_time")]
    pub hora_chegada: Option<NaiveTime>,
    #[serde(default, deserialize_with = "lenient::optional_time")]
    pub hora_entrada: Option<NaiveTime>,
    #[serde(default, deserialize_with = "lenient::optional_time")]
    pub hora_saida: Option<NaiveTime>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_emissao_nf: Option<NaiveDate>,
    pub cte_intertex: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_emissao_cte: Option<NaiveDate>,
    pub cte_transportador: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub data_emissao_cte_transp: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Entry {
    /// Builds a row from its editable fields, as the store would after an insert.
    pub fn from_fields(id: i32, fields: EntryFields, created_at: NaiveDateTime) -> Self {
        Entry {
            id,
            mes: fields.mes,
            chave_acesso: fields.chave_acesso,
            nf_numero: fields.nf_numero,
            tonelada: fields.tonelada,
            valor: fields.valor,
            descricao_produto: fields.descricao_produto,
            data_nf: fields.data_nf,
            data_descarga: fields.data_descarga,
            status: fields.status.unwrap_or_default(),
            fornecedor: fields.fornecedor,
            placa_veiculo: fields.placa_veiculo,
            container: fields.container,
            destino: fields.destino,
            data_faturamento_vli: fields.data_faturamento_vli,
            cte_vli: fields.cte_vli,
            numero_vagao: fields.numero_vagao,
            hora_chegada: fields.hora_chegada,
            hora_entrada: fields.hora_entrada,
            hora_saida: fields.hora_saida,
            data_emissao_nf: fields.data_emissao_nf,
            cte_intertex: fields.cte_intertex,
            data_emissao_cte: fields.data_emissao_cte,
            cte_transportador: fields.cte_transportador,
            data_emissao_cte_transp: fields.data_emissao_cte_transp,
            client_token: None,
            created_at,
        }
    }
}

/// Operator-editable columns. `None` means "not provided" and is inserted as `NULL`.
#[derive(Insertable, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = entries)]
pub struct EntryFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chave_acesso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nf_numero: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub tonelada: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub valor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descricao_produto: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_nf: Option<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_descarga: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fornecedor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placa_veiculo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destino: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_faturamento_vli: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cte_vli: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_vagao: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_time"
    )]
    pub hora_chegada: Option<NaiveTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_time"
    )]
    pub hora_entrada: Option<NaiveTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_time"
    )]
    pub hora_saida: Option<NaiveTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_emissao_nf: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cte_intertex: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_emissao_cte: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cte_transportador: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_date"
    )]
    pub data_emissao_cte_transp: Option<NaiveDate>,
}

/// Invokes `$mac!` with every field name of [`EntryFields`].
macro_rules! for_each_entry_field {
    ($mac:ident) => {
        $mac!(
            mes,
            chave_acesso,
            nf_numero,
            tonelada,
            valor,
            descricao_produto,
            data_nf,
            data_descarga,
            status,
            fornecedor,
            placa_veiculo,
            container,
            destino,
            data_faturamento_vli,
            cte_vli,
            numero_vagao,
            hora_chegada,
            hora_entrada,
            hora_saida,
            data_emissao_nf,
            cte_intertex,
            data_emissao_cte,
            cte_transportador,
            data_emissao_cte_transp
        )
    };
}

impl EntryFields {
    /// JSON keys accepted in create and update bodies.
    pub const COLUMNS: [&'static str; 24] = [
        "mes",
        "chave_acesso",
        "nf_numero",
        "tonelada",
        "valor",
        "descricao_produto",
        "data_nf",
        "data_descarga",
        "status",
        "fornecedor",
        "placa_veiculo",
        "container",
        "destino",
        "data_faturamento_vli",
        "cte_vli",
        "numero_vagao",
        "hora_chegada",
        "hora_entrada",
        "hora_saida",
        "data_emissao_nf",
        "cte_intertex",
        "data_emissao_cte",
        "cte_transportador",
        "data_emissao_cte_transp",
    ];

    /// True when no field is set, i.e. an update would change nothing.
    pub fn is_empty(&self) -> bool {
        macro_rules! all_none {
            ($($field:ident),*) => { true $(&& self.$field.is_none())* };
        }
        for_each_entry_field!(all_none)
    }

    /// Overlay every field set in `changes` onto `self`.
    pub fn merge(&mut self, changes: &EntryFields) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(
                    if let Some(value) = &changes.$field {
                        self.$field = Some(value.clone());
                    }
                )*
            };
        }
        for_each_entry_field!(overlay);
    }

    /// Fields of `self` that differ from `base` and are set in `self`.
    pub fn diff_from(&self, base: &EntryFields) -> EntryFields {
        let mut diff = EntryFields::default();
        macro_rules! changed {
            ($($field:ident),*) => {
                $(
                    if self.$field.is_some() && self.$field != base.$field {
                        diff.$field = self.$field.clone();
                    }
                )*
            };
        }
        for_each_entry_field!(changed);
        diff
    }
}

impl From<&Entry> for EntryFields {
    fn from(entry: &Entry) -> Self {
        EntryFields {
            mes: entry.mes.clone(),
            chave_acesso: entry.chave_acesso.clone(),
            nf_numero: entry.nf_numero.clone(),
            tonelada: entry.tonelada,
            valor: entry.valor,
            descricao_produto: entry.descricao_produto.clone(),
            data_nf: entry.data_nf,
            data_descarga: entry.data_descarga,
            status: Some(entry.status),
            fornecedor: entry.fornecedor.clone(),
            placa_veiculo: entry.placa_veiculo.clone(),
            container: entry.container.clone(),
            destino: entry.destino.clone(),
            data_faturamento_vli: entry.data_faturamento_vli,
            cte_vli: entry.cte_vli.clone(),
            numero_vagao: entry.numero_vagao.clone(),
            hora_chegada: entry.hora_chegada,
            hora_entrada: entry.hora_entrada,
            hora_saida: entry.hora_saida,
            data_emissao_nf: entry.data_emissao_nf,
            cte_intertex: entry.cte_intertex.clone(),
            data_emissao_cte: entry.data_emissao_cte,
            cte_transportador: entry.cte_transportador.clone(),
            data_emissao_cte_transp: entry.data_emissao_cte_transp,
        }
    }
}

/// Partial update of an entry.
///
/// The outer `Option` says whether the key was sent at all; `Some(None)`
/// clears the column, which is what `null` or a blank form input asks for.
/// `status` can be changed but never cleared.
#[derive(AsChangeset, Deserialize, Debug, Clone, Default, PartialEq)]
#[diesel(table_name = entries)]
pub struct EntryChangeset {
    #[serde(default, deserialize_with = "lenient::patch")]
    pub mes: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub chave_acesso: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub nf_numero: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_number")]
    pub tonelada: Option<Option<f64>>,
    #[serde(default, deserialize_with = "lenient::patch_number")]
    pub valor: Option<Option<f64>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub descricao_produto: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_nf: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_descarga: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient::present")]
    pub status: Option<EntryStatus>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub fornecedor: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub placa_veiculo: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub container: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub destino: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_faturamento_vli: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub cte_vli: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub numero_vagao: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_time")]
    pub hora_chegada: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "lenient::patch_time")]
    pub hora_entrada: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "lenient::patch_time")]
    pub hora_saida: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_emissao_nf: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub cte_intertex: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_emissao_cte: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "lenient::patch")]
    pub cte_transportador: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient::patch_date")]
    pub data_emissao_cte_transp: Option<Option<NaiveDate>>,
}

/// The value a changeset column assigns, if it assigns one.
trait Assigned {
    type Value;
    fn assigned(&self) -> Option<Self::Value>;
}

impl<T: Clone> Assigned for Option<Option<T>> {
    type Value = T;
    fn assigned(&self) -> Option<T> {
        self.clone().flatten()
    }
}

impl Assigned for Option<EntryStatus> {
    type Value = EntryStatus;
    fn assigned(&self) -> Option<EntryStatus> {
        *self
    }
}

impl EntryChangeset {
    /// True when the body named no column at all.
    pub fn is_empty(&self) -> bool {
        macro_rules! all_none {
            ($($field:ident),*) => { true $(&& self.$field.is_none())* };
        }
        for_each_entry_field!(all_none)
    }

    /// The values being written, with cleared and untouched columns as `None`.
    pub fn assigned(&self) -> EntryFields {
        let mut fields = EntryFields::default();
        macro_rules! take {
            ($($field:ident),*) => { $(fields.$field = self.$field.assigned();)* };
        }
        for_each_entry_field!(take);
        fields
    }
}

/// Read access shared by stored rows, drafts and cached entries, so the
/// aggregations run identically on the server and the client.
pub trait StockRecord {
    fn fornecedor(&self) -> Option<&str>;
    fn descricao_produto(&self) -> Option<&str>;
    fn destino(&self) -> Option<&str>;
    fn status(&self) -> Option<EntryStatus>;
    fn tonelada(&self) -> Option<f64>;
    fn data_descarga(&self) -> Option<NaiveDate>;
    fn hora_chegada(&self) -> Option<NaiveTime>;
    fn hora_entrada(&self) -> Option<NaiveTime>;
    fn hora_saida(&self) -> Option<NaiveTime>;
}

impl StockRecord for Entry {
    fn fornecedor(&self) -> Option<&str> {
        self.fornecedor.as_deref()
    }
    fn descricao_produto(&self) -> Option<&str> {
        self.descricao_produto.as_deref()
    }
    fn destino(&self) -> Option<&str> {
        self.destino.as_deref()
    }
    fn status(&self) -> Option<EntryStatus> {
        Some(self.status)
    }
    fn tonelada(&self) -> Option<f64> {
        self.tonelada
    }
    fn data_descarga(&self) -> Option<NaiveDate> {
        self.data_descarga
    }
    fn hora_chegada(&self) -> Option<NaiveTime> {
        self.hora_chegada
    }
    fn hora_entrada(&self) -> Option<NaiveTime> {
        self.hora_entrada
    }
    fn hora_saida(&self) -> Option<NaiveTime> {
        self.hora_saida
    }
}

impl StockRecord for EntryFields {
    fn fornecedor(&self) -> Option<&str> {
        self.fornecedor.as_deref()
    }
    fn descricao_produto(&self) -> Option<&str> {
        self.descricao_produto.as_deref()
    }
    fn destino(&self) -> Option<&str> {
        self.destino.as_deref()
    }
    fn status(&self) -> Option<EntryStatus> {
        self.status
    }
    fn tonelada(&self) -> Option<f64> {
        self.tonelada
    }
    fn data_descarga(&self) -> Option<NaiveDate> {
        self.data_descarga
    }
    fn hora_chegada(&self) -> Option<NaiveTime> {
        self.hora_chegada
    }
    fn hora_entrada(&self) -> Option<NaiveTime> {
        self.hora_entrada
    }
    fn hora_saida(&self) -> Option<NaiveTime> {
        self.hora_saida
    }
}

/// Response of a successful creation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedEntry {
    pub id: i32,
}

/// Response of a deletion; `changes == 0` means the id did not exist.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedEntry {
    pub changes: usize,
}

/// Optional filters of the reports view, applied to `GET /api/entries`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub fornecedor: Option<String>,
}

impl EntryFilter {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.fornecedor.as_deref().map_or(true, |f| f.trim().is_empty())
    }

    /// Date bounds are inclusive on `data_nf`; entries without a date only match
    /// when no bound is set. The supplier match is a case-insensitive substring.
    pub fn matches(&self, data_nf: Option<NaiveDate>, fornecedor: Option<&str>) -> bool {
        let after_start = match (self.start, data_nf) {
            (None, _) => true,
            (Some(start), Some(date)) => date >= start,
            (Some(_), None) => false,
        };
        let before_end = match (self.end, data_nf) {
            (None, _) => true,
            (Some(end), Some(date)) => date <= end,
            (Some(_), None) => false,
        };
        let supplier = match self.fornecedor.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => fornecedor
                .map(|f| f.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
        };
        after_start && before_end && supplier
    }
}

impl fmt::Display for EntryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start={:?} end={:?} fornecedor={:?}",
            self.start, self.end, self.fornecedor
        )
    }
}
