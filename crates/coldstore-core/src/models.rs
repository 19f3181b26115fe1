//! Archival job and table models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::WATERMARK_COLUMN;
use crate::error::{Error, Result};
use crate::value::SqlValue;

// =============================================================================
// JOB CONFIGURATION
// =============================================================================

/// One entry of the jobs file, exactly as written by the operator.
///
/// Every key is optional at this level so that an incomplete entry can be
/// reported and skipped instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTableEntry {
    /// Table-name prefix.
    #[serde(default)]
    pub table: Option<String>,
    /// Retention age in days.
    #[serde(default)]
    pub days_old: Option<i64>,
    /// Column compared against the cutoff.
    #[serde(default)]
    pub date_field: Option<String>,
}

impl ArchiveTableEntry {
    pub fn new(table: &str, days_old: i64, date_field: &str) -> Self {
        Self {
            table: Some(table.to_string()),
            days_old: Some(days_old),
            date_field: Some(date_field.to_string()),
        }
    }

    /// Validate the entry into a job spec.
    pub fn to_spec(&self) -> Result<ArchiveJobSpec> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("entry has no `table`".to_string()))?;
        let days_old = self
            .days_old
            .ok_or_else(|| Error::InvalidInput("entry has no `days_old`".to_string()))?;
        let date_field = self
            .date_field
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("entry has no `date_field`".to_string()))?;
        ArchiveJobSpec::new(table, days_old, date_field)
    }
}

/// A validated archival job: which tables, how old, by which column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveJobSpec {
    pub table_pattern: String,
    pub retention_days: i64,
    pub date_column: String,
}

impl ArchiveJobSpec {
    pub fn new(table_pattern: &str, retention_days: i64, date_column: &str) -> Result<Self> {
        let table_pattern = table_pattern.trim();
        let date_column = date_column.trim();
        if table_pattern.is_empty() {
            return Err(Error::InvalidInput("`table` is empty".to_string()));
        }
        if date_column.is_empty() {
            return Err(Error::InvalidInput("`date_field` is empty".to_string()));
        }
        if retention_days < 0 {
            return Err(Error::InvalidInput(format!(
                "`days_old` must not be negative, got {}",
                retention_days
            )));
        }
        Ok(Self {
            table_pattern: table_pattern.to_string(),
            retention_days,
            date_column: date_column.to_string(),
        })
    }

    /// Cutoff for a pass starting at `now`.
    pub fn cutoff_at(&self, now: DateTime<Utc>) -> Cutoff {
        Cutoff::from_retention(now, self.retention_days)
    }
}

// =============================================================================
// PER-RUN ENTITIES
// =============================================================================

/// A concrete primary-store table matched by a job's pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMatch {
    pub pattern: String,
    pub table: String,
}

/// Timestamp boundary: rows whose date column is strictly earlier are
/// eligible for archival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Cutoff(DateTime<Utc>);

impl Cutoff {
    pub fn from_retention(now: DateTime<Utc>, retention_days: i64) -> Self {
        Self(now - Duration::days(retention_days))
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    /// Bind value for the cutoff parameter.
    pub fn as_value(&self) -> SqlValue {
        SqlValue::TimestampTz(self.0)
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// One column of a table as reported by the store catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    /// Type rendered the way the store writes it in DDL.
    pub column_type: String,
    pub nullable: bool,
}

/// Structured definition of a primary-store table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Fail unless the table carries the watermark column.
    pub fn require_watermark_column(&self) -> Result<()> {
        if self.has_column(WATERMARK_COLUMN) {
            Ok(())
        } else {
            Err(Error::MissingWatermarkColumn {
                table: self.table.clone(),
                column: WATERMARK_COLUMN.to_string(),
            })
        }
    }
}
