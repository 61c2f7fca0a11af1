use crate::common::metrics;
use crate::common::types::EtlResult;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

mod bigquery;
mod schema;
mod token;

pub use bigquery::BigQueryWarehouse;
pub use schema::{FieldMode, FieldType, SchemaField, TableRow, TableSchema, WriteDisposition};
pub use token::AccessTokenProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub table: String,
    pub job_id: Option<String>,
    pub rows: usize,
}

/// Destination for bulk table loads.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Load newline-delimited JSON rows into `schema.table`, honouring its
    /// write disposition. Returns once the load has finished.
    async fn load(
        &self,
        schema: &TableSchema,
        ndjson: Vec<u8>,
        row_count: usize,
    ) -> EtlResult<LoadOutcome>;
}

pub fn to_ndjson<R: Serialize>(rows: &[R]) -> EtlResult<Vec<u8>> {
    let mut buffer = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// Load `rows` into the table declared by `R::schema()`. An empty row set is
/// still loaded into a truncating table so it ends up empty; appending tables
/// skip it.
pub async fn load_rows<W, R>(warehouse: &W, rows: &[R]) -> EtlResult<LoadOutcome>
where
    W: Warehouse + ?Sized,
    R: TableRow,
{
    let schema = R::schema();

    if rows.is_empty() && schema.write_disposition == WriteDisposition::Append {
        info!("No rows for table {}, skipping load", schema.table);
        return Ok(LoadOutcome {
            table: schema.table.to_string(),
            job_id: None,
            rows: 0,
        });
    }

    let ndjson = to_ndjson(rows)?;
    let outcome = warehouse
        .load(&schema, ndjson, rows.len())
        .await
        .inspect_err(|_e| metrics::increment_warehouse_load_failure())?;

    metrics::increment_warehouse_load_success();
    metrics::increment_rows_loaded(schema.table, rows.len() as u64);
    info!("Loaded {} rows into {}", outcome.rows, outcome.table);
    Ok(outcome)
}
