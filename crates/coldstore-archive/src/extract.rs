//! Selection of rows that are old enough and not yet archived.

use std::time::Instant;

use tracing::debug;

use coldstore_core::{Cutoff, RelationalStore, Result, RowRecord, SqlValue, TableSchema};

use crate::sql;

/// Reads eligible rows from the primary store.
pub struct IncrementalExtractor<'a> {
    primary: &'a dyn RelationalStore,
    schema: Option<&'a TableSchema>,
}

impl<'a> IncrementalExtractor<'a> {
    pub fn new(primary: &'a dyn RelationalStore) -> Self {
        Self {
            primary,
            schema: None,
        }
    }

    /// Known table definition. Columns without a native binding are then
    /// selected as text.
    pub fn with_schema(mut self, schema: Option<&'a TableSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Rows of `table` whose `date_column` is before `cutoff` and whose id is
    /// past `watermark`, in id order.
    pub async fn extract(
        &self,
        table: &str,
        date_column: &str,
        cutoff: Cutoff,
        watermark: i64,
    ) -> Result<Vec<RowRecord>> {
        let start = Instant::now();
        let dialect = self.primary.dialect();
        let projection = sql::projection(dialect, self.schema);
        let statement = sql::select_eligible(dialect, table, date_column, &projection);
        let params = [cutoff.as_value(), SqlValue::Int(watermark)];

        let rows = self.primary.query(&statement, &params).await?;
        debug!(
            subsystem = "archive",
            component = "extractor",
            db_table = table,
            date_column,
            watermark,
            row_count = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Rows extracted"
        );
        Ok(rows)
    }
}
