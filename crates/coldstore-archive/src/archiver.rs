//! The archival pass: discovery, replication, watermark, extraction, load.
//!
//! Specs run one after another and tables one after another. A fault stops
//! only the table (or the job's discovery) it occurred in; the run always
//! produces a report.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use coldstore_core::defaults::BATCH_SIZE;
use coldstore_core::{
    ArchiveJobSpec, ArchiveTableEntry, Error, RelationalStore, Result, TableSchema,
};

use crate::discovery::TableDiscovery;
use crate::extract::IncrementalExtractor;
use crate::loader::BatchLoader;
use crate::report::{RunReport, SkippedEntry, SpecReport, Stage, StageFault, TableReport};
use crate::schema::{SchemaIntrospector, SchemaReplicator};
use crate::watermark::WatermarkResolver;

/// Source of "now" for cutoff computation.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Archiver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiverConfig {
    /// Maximum rows per insert chunk.
    pub batch_size: usize,
    /// Discover, resolve and extract, but create and insert nothing.
    pub dry_run: bool,
    /// Verbosity the run was started with, echoed in the start banner.
    pub verbosity: u8,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            dry_run: false,
            verbosity: 1,
        }
    }
}

impl ArchiverConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Moves aged rows from the primary store into the archive store.
pub struct Archiver {
    primary: Arc<dyn RelationalStore>,
    archive: Arc<dyn RelationalStore>,
    config: ArchiverConfig,
    clock: Clock,
}

impl Archiver {
    /// Both stores must speak the same dialect, since archive DDL is derived
    /// from primary definitions.
    pub fn new(
        primary: Arc<dyn RelationalStore>,
        archive: Arc<dyn RelationalStore>,
        config: ArchiverConfig,
    ) -> Result<Self> {
        if primary.dialect() != archive.dialect() {
            return Err(Error::Config(format!(
                "primary store is {} but archive store is {}; both must use the same dialect",
                primary.dialect(),
                archive.dialect()
            )));
        }
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }
        Ok(Self {
            primary,
            archive,
            config,
            clock: Arc::new(Utc::now),
        })
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        let clock: Clock = Arc::new(clock);
        self.clock = clock;
        self
    }

    /// Run every jobs-file entry in order. Incomplete entries are skipped
    /// with a warning.
    pub async fn run(&self, entries: &[ArchiveTableEntry]) -> RunReport {
        let started_at = (self.clock)();
        let start = Instant::now();
        info!(
            subsystem = "archive",
            verbosity = self.config.verbosity,
            started_at = %started_at.to_rfc3339(),
            entries = entries.len(),
            batch_size = self.config.batch_size,
            dry_run = self.config.dry_run,
            "archive has started"
        );

        let mut skipped_entries = Vec::new();
        let mut specs = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match entry.to_spec() {
                Ok(spec) => specs.push(self.run_spec(&spec).await),
                Err(e) => {
                    warn!(
                        subsystem = "archive",
                        entry_index = index,
                        error = %e,
                        "Skipping archive entry"
                    );
                    skipped_entries.push(SkippedEntry {
                        index,
                        entry: entry.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = RunReport {
            started_at,
            finished_at: (self.clock)(),
            dry_run: self.config.dry_run,
            skipped_entries,
            specs,
        };
        info!(
            subsystem = "archive",
            tables = report.table_count(),
            rows_extracted = report.rows_extracted(),
            rows_loaded = report.rows_loaded(),
            faults = report.fault_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "archive has finished"
        );
        report
    }

    /// Archive every table matching one spec.
    pub async fn run_spec(&self, spec: &ArchiveJobSpec) -> SpecReport {
        info!(
            subsystem = "archive",
            table_pattern = %spec.table_pattern,
            retention_days = spec.retention_days,
            date_column = %spec.date_column,
            "Archiving tables"
        );

        let matches = match TableDiscovery::new(self.primary.as_ref())
            .discover(&spec.table_pattern)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                error!(
                    subsystem = "archive",
                    component = "discovery",
                    table_pattern = %spec.table_pattern,
                    error = %e,
                    "Table discovery failed"
                );
                return SpecReport {
                    spec: spec.clone(),
                    discovery_fault: Some(StageFault::new(Stage::Discovery, e)),
                    tables: Vec::new(),
                };
            }
        };

        if matches.is_empty() {
            info!(
                subsystem = "archive",
                table_pattern = %spec.table_pattern,
                "No matching tables"
            );
        }

        let mut tables = Vec::with_capacity(matches.len());
        for m in &matches {
            tables.push(self.archive_table(spec, &m.table).await);
        }
        SpecReport {
            spec: spec.clone(),
            discovery_fault: None,
            tables,
        }
    }

    /// One pass over one table. Never fails; faults land in the report.
    pub async fn archive_table(&self, spec: &ArchiveJobSpec, table: &str) -> TableReport {
        let start = Instant::now();
        let mut report = TableReport::new(table);

        if let Err(fault) = self.table_pass(spec, table, &mut report).await {
            error!(
                subsystem = "archive",
                db_table = table,
                stage = fault.stage.as_str(),
                error = %fault.message,
                "Table pass failed"
            );
            report.faults.push(fault);
        }

        info!(
            subsystem = "archive",
            db_table = table,
            row_count = report.extracted,
            rows_loaded = report.rows_loaded(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Table pass finished"
        );
        report
    }

    async fn table_pass(
        &self,
        spec: &ArchiveJobSpec,
        table: &str,
        report: &mut TableReport,
    ) -> std::result::Result<(), StageFault> {
        let primary = self.primary.as_ref();
        let archive = self.archive.as_ref();

        let cutoff = spec.cutoff_at((self.clock)());
        report.cutoff = Some(cutoff);

        let schema = self.introspect(table, &spec.date_column).await?;

        let replicator = SchemaReplicator::new(primary, archive);
        let replication = if self.config.dry_run {
            replicator.plan(table, schema.as_ref()).await
        } else {
            replicator.replicate(table, schema.as_ref()).await
        };
        let replication = replication.map_err(|e| StageFault::new(Stage::Replication, e))?;
        report.replication = Some(replication);

        let watermark = WatermarkResolver::new(archive).resolve(table).await;
        let last_archived_id = watermark.last_archived_id;
        report.watermark = Some(watermark);

        let rows = IncrementalExtractor::new(primary)
            .with_schema(schema.as_ref())
            .extract(table, &spec.date_column, cutoff, last_archived_id)
            .await
            .map_err(|e| StageFault::new(Stage::Extraction, e))?;
        report.extracted = rows.len();
        info!(
            subsystem = "archive",
            db_table = table,
            watermark = last_archived_id,
            cutoff = %cutoff.instant().to_rfc3339(),
            row_count = rows.len(),
            "Rows eligible for archival"
        );

        if self.config.dry_run {
            return Ok(());
        }

        let loader = BatchLoader::new(archive, self.config.batch_size)
            .map_err(|e| StageFault::new(Stage::Load, e))?
            .with_schema(schema.as_ref());
        let load = loader.load(table, &rows).await;
        let complete = load.is_complete();
        let fault = format!(
            "{} of {} chunks failed",
            load.failed_chunks.len(),
            load.chunks_attempted
        );
        report.load = Some(load);
        if !complete {
            return Err(StageFault::new(Stage::Load, fault));
        }
        Ok(())
    }

    /// Primary-side definition of `table`, checked for the watermark and date
    /// columns. `None` when only the MySQL DDL-text fallback can describe it.
    async fn introspect(
        &self,
        table: &str,
        date_column: &str,
    ) -> std::result::Result<Option<TableSchema>, StageFault> {
        let primary = self.primary.as_ref();
        let fault = |e: Error| StageFault::new(Stage::Introspection, e);

        let schema = match SchemaIntrospector::new(primary).describe(table).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                return Err(fault(Error::InvalidInput(format!(
                    "table {} has no columns in the {} catalog",
                    table,
                    primary.name()
                ))))
            }
            Err(e) if primary.dialect().supports_show_create_table() => {
                warn!(
                    subsystem = "archive",
                    db_table = table,
                    error = %e,
                    "Column introspection failed, continuing with DDL text"
                );
                return Ok(None);
            }
            Err(e) => return Err(fault(e)),
        };

        schema.require_watermark_column().map_err(fault)?;
        if !schema.has_column(date_column) {
            return Err(fault(Error::InvalidInput(format!(
                "table {} has no `{}` column",
                table, date_column
            ))));
        }
        Ok(Some(schema))
    }
}
