//! Dynamically shaped row values.
//!
//! Source tables have no schema known at compile time, so a row is an ordered
//! list of column names paired with tagged values. Rows produced by the same
//! query share one column list.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use uuid::Uuid;

/// Logical type of a column value, kept on NULLs so they can be bound with
/// the right parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlType),
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(JsonValue),
    Uuid(Uuid),
}

impl SqlValue {
    /// Logical type of this value.
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null(ty) => *ty,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::Int(_) => SqlType::Int,
            SqlValue::Float(_) => SqlType::Float,
            SqlValue::Decimal(_) => SqlType::Decimal,
            SqlValue::Text(_) => SqlType::Text,
            SqlValue::Bytes(_) => SqlType::Bytes,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
            SqlValue::TimestampTz(_) => SqlType::TimestampTz,
            SqlValue::Json(_) => SqlType::Json,
            SqlValue::Uuid(_) => SqlType::Uuid,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view; MySQL reports predicates as 0/1 integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Point in time carried by a temporal value. Naive timestamps and dates
    /// are read as UTC.
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::TimestampTz(ts) => Some(*ts),
            SqlValue::Timestamp(ts) => Some(ts.and_utc()),
            SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc()),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(v)
    }
}

/// One source row: column names in select order paired with values.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl RowRecord {
    /// Build a record. `columns` and `values` must have the same length.
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a record from owned `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, SqlValue)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) =
            pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Value at a select-list position.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A bounded, ordered run of records sharing one column list.
#[derive(Debug, Clone, Copy)]
pub struct RowBatch<'a> {
    /// Zero-based position of this batch in the load.
    pub index: usize,
    pub rows: &'a [RowRecord],
}

impl<'a> RowBatch<'a> {
    /// Split `rows` into consecutive batches of at most `batch_size` records,
    /// preserving order. A `batch_size` of zero is treated as one.
    pub fn partition(rows: &'a [RowRecord], batch_size: usize) -> Vec<RowBatch<'a>> {
        rows.chunks(batch_size.max(1))
            .enumerate()
            .map(|(index, rows)| RowBatch { index, rows })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First record whose columns differ from `columns`, if any.
    pub fn first_mismatch(&self, columns: &[String]) -> Option<usize> {
        self.rows.iter().position(|r| r.columns() != columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: i64) -> RowRecord {
        RowRecord::from_pairs([
            ("id", SqlValue::Int(id)),
            ("note", SqlValue::Text(format!("row {}", id))),
        ])
    }

    #[test]
    fn test_record_lookup_by_name() {
        let r = record(7);
        assert_eq!(r.get("id"), Some(&SqlValue::Int(7)));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.columns(), &["id".to_string(), "note".to_string()]);
    }

    #[test]
    fn test_partition_sizes() {
        let rows: Vec<RowRecord> = (1..=25).map(record).collect();
        let batches = RowBatch::partition(&rows, 10);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[1].rows[0].get("id"), Some(&SqlValue::Int(11)));
    }

    #[test]
    fn test_partition_empty() {
        assert!(RowBatch::partition(&[], 10).is_empty());
    }

    #[test]
    fn test_batch_first_mismatch() {
        let rows = vec![
            record(1),
            RowRecord::from_pairs([("id", SqlValue::Int(2))]),
        ];
        let batch = RowBatch { index: 0, rows: &rows };
        assert_eq!(batch.first_mismatch(rows[0].columns()), Some(1));
    }

    #[test]
    fn test_null_keeps_type() {
        let v = SqlValue::Null(SqlType::Int);
        assert!(v.is_null());
        assert_eq!(v.sql_type(), SqlType::Int);
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(SqlValue::Int(42).as_i64(), Some(42));
        assert_eq!(SqlValue::Text(" 17 ".into()).as_i64(), Some(17));
        assert_eq!(SqlValue::Float(1.5).as_i64(), None);
        assert_eq!(SqlValue::Null(SqlType::Int).as_i64(), None);
    }

    #[test]
    fn test_as_bool_accepts_mysql_integers() {
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Bool(true).as_bool(), Some(true));
    }

    #[test]
    fn test_as_instant() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(SqlValue::TimestampTz(ts).as_instant(), Some(ts));
        assert_eq!(SqlValue::Timestamp(ts.naive_utc()).as_instant(), Some(ts));
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            SqlValue::Date(day).as_instant(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(SqlValue::Int(3).as_instant(), None);
    }
}
