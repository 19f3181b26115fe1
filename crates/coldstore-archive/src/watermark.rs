//! Resume cursor for incremental archival.

use tracing::debug;

use coldstore_core::defaults::INITIAL_WATERMARK;
use coldstore_core::{RelationalStore, SqlValue};

use crate::report::{ResolvedWatermark, WatermarkSource};
use crate::sql;

/// Reads the highest archived id of a table from the archive store.
pub struct WatermarkResolver<'a> {
    archive: &'a dyn RelationalStore,
}

impl<'a> WatermarkResolver<'a> {
    pub fn new(archive: &'a dyn RelationalStore) -> Self {
        Self { archive }
    }

    /// Highest archived id, or zero when the archive table is empty, missing
    /// or unqueryable. A missing table is the normal first-run state, so
    /// failures are only logged at debug.
    pub async fn resolve(&self, table: &str) -> ResolvedWatermark {
        let statement = sql::max_watermark(self.archive.dialect(), table);
        let resolved = match self.archive.query(&statement, &[]).await {
            Ok(rows) => {
                let highest = rows
                    .first()
                    .and_then(|r| r.get_index(0))
                    .and_then(SqlValue::as_i64);
                match highest {
                    Some(id) => ResolvedWatermark {
                        last_archived_id: id,
                        source: WatermarkSource::Archived,
                    },
                    None => ResolvedWatermark {
                        last_archived_id: INITIAL_WATERMARK,
                        source: WatermarkSource::Empty,
                    },
                }
            }
            Err(e) => {
                debug!(
                    subsystem = "archive",
                    component = "watermark",
                    db_table = table,
                    error = %e,
                    "Watermark unavailable, archiving from the beginning"
                );
                ResolvedWatermark {
                    last_archived_id: INITIAL_WATERMARK,
                    source: WatermarkSource::Unavailable {
                        reason: e.to_string(),
                    },
                }
            }
        };

        debug!(
            subsystem = "archive",
            component = "watermark",
            db_table = table,
            watermark = resolved.last_archived_id,
            "Watermark resolved"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use coldstore_core::RowRecord;

    fn row(id: i64) -> RowRecord {
        RowRecord::from_pairs([("id", SqlValue::Int(id))])
    }

    #[tokio::test]
    async fn test_resolve_highest_id() {
        let archive = MemoryStore::new("archive").with_table("orders", &["id"]);
        archive.insert_rows("orders", vec![row(3), row(41), row(17)]);

        let resolved = WatermarkResolver::new(&archive).resolve("orders").await;
        assert_eq!(resolved.last_archived_id, 41);
        assert_eq!(resolved.source, WatermarkSource::Archived);
    }

    #[tokio::test]
    async fn test_resolve_empty_table_is_zero() {
        let archive = MemoryStore::new("archive").with_table("orders", &["id"]);
        let resolved = WatermarkResolver::new(&archive).resolve("orders").await;
        assert_eq!(resolved.last_archived_id, 0);
        assert_eq!(resolved.source, WatermarkSource::Empty);
    }

    #[tokio::test]
    async fn test_resolve_missing_table_is_zero() {
        let archive = MemoryStore::new("archive");
        let resolved = WatermarkResolver::new(&archive).resolve("orders").await;
        assert_eq!(resolved.last_archived_id, 0);
        assert!(matches!(resolved.source, WatermarkSource::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_resolve_without_id_column_is_zero() {
        let archive = MemoryStore::new("archive").with_table("events", &["uuid"]);
        let resolved = WatermarkResolver::new(&archive).resolve("events").await;
        assert_eq!(resolved.last_archived_id, 0);
        assert!(matches!(resolved.source, WatermarkSource::Unavailable { .. }));
    }
}
