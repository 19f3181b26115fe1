//! MySQL store.
//!
//! MySQL reports far more wire types than PostgreSQL and sqlx names them by
//! their DDL spelling, so decoding matches on the common names and falls back
//! to text, then bytes, for the rest.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Column, MySql, Row, TypeInfo};
use tracing::debug;

use coldstore_core::logging::normalize_spaces;
use coldstore_core::{
    Dialect, Error, RelationalStore, Result, RowRecord, SqlType, SqlValue, Statement,
};

use crate::pool::{create_mysql_pool_with_config, PoolConfig};
use crate::statement_head;

/// [`RelationalStore`] backed by a MySQL pool.
#[derive(Clone)]
pub struct MySqlStore {
    name: String,
    pool: MySqlPool,
    database: String,
}

impl MySqlStore {
    /// Wrap an existing pool. `database` scopes catalog lookups.
    pub fn new(name: impl Into<String>, pool: MySqlPool, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool,
            database: database.into(),
        }
    }

    /// Connect a pool and resolve the catalog scope, defaulting to the
    /// database named in the URL.
    pub async fn connect(
        name: &str,
        database_url: &str,
        config: &PoolConfig,
        database: Option<String>,
    ) -> Result<Self> {
        let pool = create_mysql_pool_with_config(name, database_url, config).await?;
        let database = match database {
            Some(database) => database,
            None => sqlx::query_scalar::<_, Option<String>>("SELECT DATABASE()")
                .fetch_one(&pool)
                .await?
                .ok_or_else(|| {
                    Error::Config(format!("{} database URL does not name a database", name))
                })?,
        };
        Ok(Self::new(name, pool, database))
    }
}

#[async_trait]
impl RelationalStore for MySqlStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn catalog_schema(&self) -> &str {
        &self.database
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowRecord>> {
        let start = Instant::now();
        debug!(subsystem = "db", store = %self.name, op = "query", sql = %normalize_spaces(sql), "sql>");

        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        let records = decode_rows(&rows)?;

        debug!(
            subsystem = "db",
            store = %self.name,
            row_count = records.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(records)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!(subsystem = "db", store = %self.name, op = "execute", sql = %normalize_spaces(sql), "sql>");
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn execute_many(&self, statements: &[Statement]) -> Result<u64> {
        let start = Instant::now();
        // Rolled back on drop if any statement fails.
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for statement in statements {
            debug!(
                subsystem = "db",
                store = %self.name,
                op = "execute_many",
                sql = %normalize_spaces(statement_head(&statement.sql)),
                param_count = statement.params.len(),
                "sql>"
            );
            affected += bind_all(sqlx::query(&statement.sql), &statement.params)
                .persistent(false)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(
            subsystem = "db",
            store = %self.name,
            statement_count = statements.len(),
            row_count = affected,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch committed"
        );
        Ok(affected)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value.clone() {
        SqlValue::Null(ty) => match ty {
            SqlType::Bool => query.bind(None::<bool>),
            SqlType::Int => query.bind(None::<i64>),
            SqlType::Float => query.bind(None::<f64>),
            SqlType::Decimal => query.bind(None::<BigDecimal>),
            SqlType::Text | SqlType::Uuid => query.bind(None::<String>),
            SqlType::Bytes => query.bind(None::<Vec<u8>>),
            SqlType::Date => query.bind(None::<NaiveDate>),
            SqlType::Time => query.bind(None::<NaiveTime>),
            SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
            SqlType::TimestampTz => query.bind(None::<DateTime<Utc>>),
            SqlType::Json => query.bind(None::<JsonValue>),
        },
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Bytes(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
        SqlValue::TimestampTz(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(v),
        // MySQL has no native UUID type; archives hold them as CHAR(36).
        SqlValue::Uuid(v) => query.bind(v.hyphenated().to_string()),
    }
}

fn decode_rows(rows: &[MySqlRow]) -> Result<Vec<RowRecord>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    rows.iter()
        .map(|row| {
            let values = (0..columns.len())
                .map(|i| decode_value(row, i))
                .collect::<Result<Vec<_>>>()?;
            Ok(RowRecord::new(Arc::clone(&columns), values))
        })
        .collect()
}

fn or_null<T>(value: Option<T>, ty: SqlType, wrap: impl FnOnce(T) -> SqlValue) -> SqlValue {
    value.map(wrap).unwrap_or(SqlValue::Null(ty))
}

fn decode_value(row: &MySqlRow, index: usize) -> Result<SqlValue> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let value = match type_name {
        "BOOLEAN" => or_null(row.try_get(index)?, SqlType::Bool, SqlValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            or_null(row.try_get(index)?, SqlType::Int, SqlValue::Int)
        }
        "YEAR" => match row.try_get::<Option<u16>, _>(index) {
            Ok(value) => or_null(value, SqlType::Int, |v| SqlValue::Int(v.into())),
            Err(_) => decode_fallback(row, index)?,
        },
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let value: Option<u64> = row.try_get(index)?;
            match value {
                Some(v) => SqlValue::Int(i64::try_from(v).map_err(|_| {
                    Error::UnsupportedType {
                        column: column.name().to_string(),
                        type_name: format!("{} value {}", type_name, v),
                    }
                })?),
                None => SqlValue::Null(SqlType::Int),
            }
        }
        "FLOAT" => or_null(row.try_get::<Option<f32>, _>(index)?, SqlType::Float, |v| {
            SqlValue::Float(v.into())
        }),
        "DOUBLE" => or_null(row.try_get(index)?, SqlType::Float, SqlValue::Float),
        "DECIMAL" => or_null(row.try_get(index)?, SqlType::Decimal, SqlValue::Decimal),
        "DATE" => or_null(row.try_get(index)?, SqlType::Date, SqlValue::Date),
        "TIME" => or_null(row.try_get(index)?, SqlType::Time, SqlValue::Time),
        "DATETIME" => or_null(row.try_get(index)?, SqlType::Timestamp, SqlValue::Timestamp),
        "TIMESTAMP" => or_null(
            row.try_get(index)?,
            SqlType::TimestampTz,
            SqlValue::TimestampTz,
        ),
        "JSON" => or_null(row.try_get(index)?, SqlType::Json, SqlValue::Json),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            or_null(row.try_get(index)?, SqlType::Bytes, SqlValue::Bytes)
        }
        _ => decode_fallback(row, index)?,
    };
    Ok(value)
}

/// Text-like and unrecognised types: try text, then raw bytes.
fn decode_fallback(row: &MySqlRow, index: usize) -> Result<SqlValue> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(or_null(value, SqlType::Text, SqlValue::Text));
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return Ok(or_null(value, SqlType::Bytes, SqlValue::Bytes));
    }
    let column = &row.columns()[index];
    Err(Error::UnsupportedType {
        column: column.name().to_string(),
        type_name: column.type_info().name().to_string(),
    })
}
