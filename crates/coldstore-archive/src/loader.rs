//! Chunked, chunk-isolated loading into the archive store.

use std::time::Instant;

use tracing::{debug, error, info, trace};

use coldstore_core::defaults::MAX_BIND_PARAMS;
use coldstore_core::{Error, RelationalStore, Result, RowBatch, RowRecord, Statement, TableSchema};

use crate::report::{ChunkFailure, LoadReport};
use crate::sql;

/// Inserts extracted rows into the archive in bounded chunks.
///
/// Each chunk is one atomic `execute_many` call made of multi-row inserts,
/// split so no statement exceeds the bind-parameter limit. A failing chunk is
/// recorded and the remaining chunks are still attempted.
pub struct BatchLoader<'a> {
    archive: &'a dyn RelationalStore,
    batch_size: usize,
    schema: Option<&'a TableSchema>,
}

/// Column layout shared by every chunk of one load.
struct InsertShape {
    columns: Vec<String>,
    casts: Vec<Option<String>>,
    rows_per_statement: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(archive: &'a dyn RelationalStore, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be at least 1".to_string()));
        }
        Ok(Self {
            archive,
            batch_size,
            schema: None,
        })
    }

    /// Definition of the rows' source table. Columns that were selected as
    /// text are cast back to their type on insert.
    pub fn with_schema(mut self, schema: Option<&'a TableSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Insert `rows` into `table`. The column list comes from the first row.
    /// An empty input issues no statement.
    pub async fn load(&self, table: &str, rows: &[RowRecord]) -> LoadReport {
        let mut report = LoadReport::default();
        let Some(first) = rows.first() else {
            debug!(
                subsystem = "archive",
                component = "loader",
                db_table = table,
                "Nothing to load"
            );
            return report;
        };

        let start = Instant::now();
        let columns = first.columns().to_vec();
        let shape = InsertShape {
            casts: sql::column_casts(self.archive.dialect(), self.schema, &columns),
            rows_per_statement: (MAX_BIND_PARAMS / columns.len().max(1)).max(1),
            columns,
        };

        for batch in RowBatch::partition(rows, self.batch_size) {
            report.chunks_attempted += 1;
            let first_row = batch.index * self.batch_size;

            match self.load_chunk(table, &shape, &batch).await {
                Ok(()) => {
                    report.rows_loaded += batch.len() as u64;
                    trace!(
                        subsystem = "archive",
                        component = "loader",
                        db_table = table,
                        chunk_index = batch.index,
                        row_count = batch.len(),
                        "Chunk committed"
                    );
                }
                Err(e) => {
                    error!(
                        subsystem = "archive",
                        component = "loader",
                        db_table = table,
                        chunk_index = batch.index,
                        first_row,
                        row_count = batch.len(),
                        error = %e,
                        "Chunk insert failed"
                    );
                    report.failed_chunks.push(ChunkFailure {
                        index: batch.index,
                        first_row,
                        rows: batch.len(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            subsystem = "archive",
            component = "loader",
            db_table = table,
            row_count = report.rows_loaded,
            failed_chunks = report.failed_chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Rows loaded"
        );
        report
    }

    async fn load_chunk(&self, table: &str, shape: &InsertShape, batch: &RowBatch<'_>) -> Result<()> {
        if let Some(offset) = batch.first_mismatch(&shape.columns) {
            return Err(Error::InvalidInput(format!(
                "row {} of chunk {} does not have the columns of the first row",
                offset, batch.index
            )));
        }
        let dialect = self.archive.dialect();
        let statements: Vec<Statement> = batch
            .rows
            .chunks(shape.rows_per_statement)
            .map(|group| {
                Statement::new(
                    sql::insert_rows(dialect, table, &shape.columns, &shape.casts, group.len()),
                    group.iter().flat_map(|r| r.values().iter().cloned()).collect(),
                )
            })
            .collect();
        self.archive.execute_many(&statements).await?;
        Ok(())
    }
}
