use crate::{
    models::{
        entry::{operations as entry_ops, EntryFilter},
        stock_summary::{
            self, summarize_daily_performance, DailyPerformance, ProductDestinationStock,
            SupplierStock,
        },
    },
    services::functional_patterns::QueryReader,
};

pub fn stock_by_supplier_reader() -> QueryReader<Vec<SupplierStock>> {
    QueryReader::new(stock_summary::stock_by_supplier)
}

pub fn stock_by_product_destination_reader() -> QueryReader<Vec<ProductDestinationStock>> {
    QueryReader::new(stock_summary::stock_by_product_destination)
}

/// Daily throughput is grouped in memory over the full listing.
pub fn daily_performance_reader() -> QueryReader<Vec<DailyPerformance>> {
    QueryReader::new(|conn| entry_ops::list_entries(&EntryFilter::default(), conn))
        .map(|rows| summarize_daily_performance(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::db::init_store,
        models::entry::{operations::create_entry, EntryFields, EntryStatus},
        services::functional_patterns::run_query,
    };

    #[test]
    fn test_sql_and_in_memory_summaries_agree() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_store(&dir.path().join("stock.db").to_string_lossy(), 1).unwrap();
        let mut conn = pool.get().unwrap();

        let samples = [
            (Some("ACME"), Some("Soja"), EntryStatus::Estoque),
            (Some("ACME"), Some("Soja"), EntryStatus::Embarcado),
            (None, None, EntryStatus::Rejeitado),
            (Some("Beta"), Some("Milho"), EntryStatus::Devolvido),
        ];
        for (fornecedor, produto, status) in samples {
            let fields = EntryFields {
                fornecedor: fornecedor.map(str::to_string),
                descricao_produto: produto.map(str::to_string),
                status: Some(status),
                ..Default::default()
            };
            create_entry(fields, None, &mut conn).unwrap();
        }
        let rows = entry_ops::list_entries(&EntryFilter::default(), &mut conn).unwrap();
        drop(conn);

        let by_supplier = run_query(stock_by_supplier_reader(), &pool).unwrap();
        assert_eq!(by_supplier, stock_summary::summarize_by_supplier(&rows));
        assert_eq!(by_supplier[0].fornecedor, None);
        for group in &by_supplier {
            let total = rows
                .iter()
                .filter(|r| r.fornecedor == group.fornecedor)
                .count() as i64;
            assert!(group.in_stock + group.exited <= total);
        }

        let by_product = run_query(stock_by_product_destination_reader(), &pool).unwrap();
        assert_eq!(
            by_product,
            stock_summary::summarize_by_product_destination(&rows)
        );

        let daily = run_query(daily_performance_reader(), &pool).unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].entries, 4);
    }
}
