//! Derived stock views.
//!
//! The SQL aggregations serve the HTTP API. The `summarize_*` functions group
//! any slice of [`StockRecord`]s with the same rules, so the offline client
//! and the daily performance endpoint produce identical shapes.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use diesel::{
    prelude::*,
    sql_query,
    sql_types::{BigInt, Nullable, Text},
};
use serde::{Deserialize, Serialize};

use crate::{config::db::Connection, error::ServiceError, models::entry::StockRecord};

#[derive(QueryableByName, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SupplierStock {
    #[diesel(sql_type = Nullable<Text>)]
    pub fornecedor: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub in_stock: i64,
    #[diesel(sql_type = BigInt)]
    pub exited: i64,
}

#[derive(QueryableByName, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProductDestinationStock {
    #[diesel(sql_type = Nullable<Text>)]
    pub descricao_produto: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub destino: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub in_stock: i64,
    #[diesel(sql_type = BigInt)]
    pub exited: i64,
}

/// One unloading day.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DailyPerformance {
    pub data_descarga: Option<NaiveDate>,
    pub entries: i64,
    pub tonelada: f64,
    /// Minutes from arrival to gate entry, `None` when no entry has both times.
    pub avg_wait_minutes: Option<f64>,
    /// Minutes from gate entry to exit.
    pub avg_unload_minutes: Option<f64>,
}

const SUPPLIER_SQL: &str = "\
    SELECT fornecedor, \
           SUM(CASE WHEN status IN ('Estoque', 'Rejeitado') THEN 1 ELSE 0 END) AS in_stock, \
           SUM(CASE WHEN status IN ('Embarcado', 'Devolvido') THEN 1 ELSE 0 END) AS exited \
    FROM entries \
    GROUP BY fornecedor \
    ORDER BY fornecedor ASC";

const PRODUCT_DESTINATION_SQL: &str = "\
    SELECT descricao_produto, destino, \
           SUM(CASE WHEN status IN ('Estoque', 'Rejeitado') THEN 1 ELSE 0 END) AS in_stock, \
           SUM(CASE WHEN status IN ('Embarcado', 'Devolvido') THEN 1 ELSE 0 END) AS exited \
    FROM entries \
    GROUP BY descricao_produto, destino \
    ORDER BY descricao_produto ASC, destino ASC";

pub fn stock_by_supplier(conn: &mut Connection) -> Result<Vec<SupplierStock>, ServiceError> {
    sql_query(SUPPLIER_SQL)
        .load::<SupplierStock>(conn)
        .map_err(|err| {
            log::error!("Failed to aggregate stock by supplier: {}", err);
            ServiceError::from(err).with_tag("stock-summary")
        })
}

pub fn stock_by_product_destination(
    conn: &mut Connection,
) -> Result<Vec<ProductDestinationStock>, ServiceError> {
    sql_query(PRODUCT_DESTINATION_SQL)
        .load::<ProductDestinationStock>(conn)
        .map_err(|err| {
            log::error!("Failed to aggregate stock by product/destination: {}", err);
            ServiceError::from(err).with_tag("stock-summary")
        })
}

#[derive(Default)]
struct Counts {
    in_stock: i64,
    exited: i64,
}

impl Counts {
    fn add<R: StockRecord>(&mut self, record: &R) {
        match record.status() {
            Some(status) if status.is_in_stock() => self.in_stock += 1,
            Some(status) if status.is_exited() => self.exited += 1,
            _ => {}
        }
    }
}

/// Per-supplier counts, ordered like the SQL (`None` first).
pub fn summarize_by_supplier<R: StockRecord>(records: &[R]) -> Vec<SupplierStock> {
    let mut groups: BTreeMap<Option<String>, Counts> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.fornecedor().map(str::to_string))
            .or_default()
            .add(record);
    }
    groups
        .into_iter()
        .map(|(fornecedor, counts)| SupplierStock {
            fornecedor,
            in_stock: counts.in_stock,
            exited: counts.exited,
        })
        .collect()
}

pub fn summarize_by_product_destination<R: StockRecord>(
    records: &[R],
) -> Vec<ProductDestinationStock> {
    let mut groups: BTreeMap<(Option<String>, Option<String>), Counts> = BTreeMap::new();
    for record in records {
        let key = (
            record.descricao_produto().map(str::to_string),
            record.destino().map(str::to_string),
        );
        groups.entry(key).or_default().add(record);
    }
    groups
        .into_iter()
        .map(|((descricao_produto, destino), counts)| ProductDestinationStock {
            descricao_produto,
            destino,
            in_stock: counts.in_stock,
            exited: counts.exited,
        })
        .collect()
}

fn minutes_between(from: Option<NaiveTime>, to: Option<NaiveTime>) -> Option<f64> {
    let minutes = (to? - from?).num_seconds() as f64 / 60.0;
    (minutes >= 0.0).then_some(minutes)
}

#[derive(Default)]
struct DayTotals {
    entries: i64,
    tonelada: f64,
    wait: Vec<f64>,
    unload: Vec<f64>,
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Per-day throughput. Intervals that run backwards are left out of the averages.
pub fn summarize_daily_performance<R: StockRecord>(records: &[R]) -> Vec<DailyPerformance> {
    let mut days: BTreeMap<Option<NaiveDate>, DayTotals> = BTreeMap::new();
    for record in records {
        let totals = days.entry(record.data_descarga()).or_default();
        totals.entries += 1;
        totals.tonelada += record.tonelada().unwrap_or(0.0);
        if let Some(wait) = minutes_between(record.hora_chegada(), record.hora_entrada()) {
            totals.wait.push(wait);
        }
        if let Some(unload) = minutes_between(record.hora_entrada(), record.hora_saida()) {
            totals.unload.push(unload);
        }
    }
    days.into_iter()
        .map(|(data_descarga, totals)| DailyPerformance {
            data_descarga,
            entries: totals.entries,
            tonelada: totals.tonelada,
            avg_wait_minutes: average(&totals.wait),
            avg_unload_minutes: average(&totals.unload),
        })
        .collect()
}
