//! Table discovery: which primary-store tables a job pattern covers.

use std::time::Instant;

use tracing::debug;

use coldstore_core::dialect::prefix_pattern;
use coldstore_core::{RelationalStore, Result, SqlValue, TableMatch};

use crate::sql;

/// Lists primary-store tables whose name starts with a job's pattern.
pub struct TableDiscovery<'a> {
    store: &'a dyn RelationalStore,
}

impl<'a> TableDiscovery<'a> {
    pub fn new(store: &'a dyn RelationalStore) -> Self {
        Self { store }
    }

    /// Tables matching `pattern` as a prefix, in name order. No match is an
    /// empty list, not an error. LIKE metacharacters in the pattern are
    /// matched literally.
    pub async fn discover(&self, pattern: &str) -> Result<Vec<TableMatch>> {
        let start = Instant::now();
        let dialect = self.store.dialect();
        let params = [
            SqlValue::from(self.store.catalog_schema()),
            SqlValue::Text(prefix_pattern(pattern)),
        ];

        let rows = self.store.query(sql::list_tables(dialect), &params).await?;
        let matches: Vec<TableMatch> = rows
            .iter()
            .filter_map(|row| row.get_index(0).and_then(sql::catalog_text))
            .map(|table| TableMatch {
                pattern: pattern.to_string(),
                table,
            })
            .collect();

        debug!(
            subsystem = "archive",
            component = "discovery",
            table_pattern = pattern,
            row_count = matches.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tables discovered"
        );
        Ok(matches)
    }
}
