//! Per-stage outcomes and the run report.
//!
//! Faults never cross table or job boundaries; they are collected here so a
//! caller can tell "fully archived" apart from "skipped after a fault".

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use coldstore_core::{ArchiveJobSpec, ArchiveTableEntry, Cutoff};

/// Pipeline stage a fault belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Introspection,
    Replication,
    Extraction,
    Load,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Introspection => "introspection",
            Stage::Replication => "replication",
            Stage::Extraction => "extraction",
            Stage::Load => "load",
        }
    }
}

/// A fault contained to one stage of one table (or one job's discovery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFault {
    pub stage: Stage,
    pub message: String,
}

impl StageFault {
    pub fn new(stage: Stage, message: impl ToString) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }
}

/// What schema replication did for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Replication {
    /// The archive table already existed.
    AlreadyPresent,
    /// The archive table was created with this DDL.
    Created { ddl: String },
    /// Dry run: the archive table is missing and would be created.
    Planned { ddl: String },
}

/// Where a table's watermark came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WatermarkSource {
    /// Highest id present in the archive table.
    Archived,
    /// The archive table exists but holds no rows.
    Empty,
    /// The archive could not be queried; archival starts from the beginning.
    Unavailable { reason: String },
}

/// Resolved resume cursor for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWatermark {
    pub last_archived_id: i64,
    #[serde(flatten)]
    pub source: WatermarkSource,
}

/// A chunk the archive store rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    /// Zero-based chunk index.
    pub index: usize,
    /// Offset of the chunk's first row in the extracted sequence.
    pub first_row: usize,
    pub rows: usize,
    pub error: String,
}

/// Outcome of loading one table's extracted rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_loaded: u64,
    pub chunks_attempted: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Everything that happened to one table in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub cutoff: Option<Cutoff>,
    pub replication: Option<Replication>,
    pub watermark: Option<ResolvedWatermark>,
    /// Rows selected for archival.
    pub extracted: usize,
    pub load: Option<LoadReport>,
    pub faults: Vec<StageFault>,
}

impl TableReport {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            cutoff: None,
            replication: None,
            watermark: None,
            extracted: 0,
            load: None,
            faults: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.load.as_ref().map_or(0, |l| l.rows_loaded)
    }
}

/// Outcome of one job spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecReport {
    pub spec: ArchiveJobSpec,
    pub discovery_fault: Option<StageFault>,
    pub tables: Vec<TableReport>,
}

/// A jobs-file entry that was not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub index: usize,
    pub entry: ArchiveTableEntry,
    pub reason: String,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub skipped_entries: Vec<SkippedEntry>,
    pub specs: Vec<SpecReport>,
}

impl RunReport {
    pub fn tables(&self) -> impl Iterator<Item = &TableReport> {
        self.specs.iter().flat_map(|s| s.tables.iter())
    }

    pub fn table_count(&self) -> usize {
        self.tables().count()
    }

    pub fn rows_extracted(&self) -> usize {
        self.tables().map(|t| t.extracted).sum()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.tables().map(TableReport::rows_loaded).sum()
    }

    /// Discovery faults plus every table-level fault.
    pub fn fault_count(&self) -> usize {
        let discovery = self
            .specs
            .iter()
            .filter(|s| s.discovery_fault.is_some())
            .count();
        discovery + self.tables().map(|t| t.faults.len()).sum::<usize>()
    }

    pub fn is_clean(&self) -> bool {
        self.fault_count() == 0 && self.skipped_entries.is_empty()
    }

    /// Human-readable summary, one line per table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(
            out,
            "archive run{}: {} tables, {} rows extracted, {} rows loaded, {} faults",
            mode,
            self.table_count(),
            self.rows_extracted(),
            self.rows_loaded(),
            self.fault_count()
        );
        for skipped in &self.skipped_entries {
            let _ = writeln!(out, "  skipped entry #{}: {}", skipped.index, skipped.reason);
        }
        for spec in &self.specs {
            let _ = writeln!(
                out,
                "  {}* (older than {} days by {})",
                spec.spec.table_pattern, spec.spec.retention_days, spec.spec.date_column
            );
            if let Some(fault) = &spec.discovery_fault {
                let _ = writeln!(out, "    discovery failed: {}", fault.message);
            }
            if spec.tables.is_empty() && spec.discovery_fault.is_none() {
                let _ = writeln!(out, "    no matching tables");
            }
            for table in &spec.tables {
                let watermark = table
                    .watermark
                    .as_ref()
                    .map_or(0, |w| w.last_archived_id);
                let _ = writeln!(
                    out,
                    "    {}: watermark {}, extracted {}, loaded {}",
                    table.table,
                    watermark,
                    table.extracted,
                    table.rows_loaded()
                );
                for fault in &table.faults {
                    let _ = writeln!(out, "      {} failed: {}", fault.stage.as_str(), fault.message);
                }
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
