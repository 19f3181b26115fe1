//! PostgreSQL store.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPool, PgRow, PgTypeKind};
use sqlx::query::Query;
use sqlx::types::BigDecimal;
use sqlx::{Column, Postgres, Row, TypeInfo};
use tracing::debug;
use uuid::Uuid;

use coldstore_core::logging::normalize_spaces;
use coldstore_core::{
    Dialect, Error, RelationalStore, Result, RowRecord, SqlType, SqlValue, Statement,
};

use crate::pool::{create_pg_pool_with_config, PoolConfig};
use crate::statement_head;

/// [`RelationalStore`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    name: String,
    pool: PgPool,
    schema: String,
}

impl PgStore {
    /// Wrap an existing pool. `schema` scopes catalog lookups.
    pub fn new(name: impl Into<String>, pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool,
            schema: schema.into(),
        }
    }

    /// Connect a pool and resolve the catalog schema, defaulting to the
    /// connection's `current_schema()`.
    pub async fn connect(
        name: &str,
        database_url: &str,
        config: &PoolConfig,
        schema: Option<String>,
    ) -> Result<Self> {
        let pool = create_pg_pool_with_config(name, database_url, config).await?;
        let schema = match schema {
            Some(schema) => schema,
            None => sqlx::query_scalar::<_, String>("SELECT current_schema()::text")
                .fetch_one(&pool)
                .await?,
        };
        Ok(Self::new(name, pool, schema))
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn catalog_schema(&self) -> &str {
        &self.schema
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
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value.clone() {
        SqlValue::Null(ty) => match ty {
            SqlType::Bool => query.bind(None::<bool>),
            SqlType::Int => query.bind(None::<i64>),
            SqlType::Float => query.bind(None::<f64>),
            SqlType::Decimal => query.bind(None::<BigDecimal>),
            SqlType::Text => query.bind(None::<String>),
            SqlType::Bytes => query.bind(None::<Vec<u8>>),
            SqlType::Date => query.bind(None::<NaiveDate>),
            SqlType::Time => query.bind(None::<NaiveTime>),
            SqlType::Timestamp => query.bind(None::<NaiveDateTime>),
            SqlType::TimestampTz => query.bind(None::<DateTime<Utc>>),
            SqlType::Json => query.bind(None::<JsonValue>),
            SqlType::Uuid => query.bind(None::<Uuid>),
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
        SqlValue::Uuid(v) => query.bind(v),
    }
}

fn decode_rows(rows: &[PgRow]) -> Result<Vec<RowRecord>> {
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

fn decode_value(row: &PgRow, index: usize) -> Result<SqlValue> {
    let column = &row.columns()[index];
    let value = match column.type_info().name() {
        "BOOL" => or_null(row.try_get(index)?, SqlType::Bool, SqlValue::Bool),
        "INT2" => or_null(row.try_get::<Option<i16>, _>(index)?, SqlType::Int, |v| {
            SqlValue::Int(v.into())
        }),
        "INT4" => or_null(row.try_get::<Option<i32>, _>(index)?, SqlType::Int, |v| {
            SqlValue::Int(v.into())
        }),
        "INT8" => or_null(row.try_get(index)?, SqlType::Int, SqlValue::Int),
        "FLOAT4" => or_null(row.try_get::<Option<f32>, _>(index)?, SqlType::Float, |v| {
            SqlValue::Float(v.into())
        }),
        "FLOAT8" => or_null(row.try_get(index)?, SqlType::Float, SqlValue::Float),
        "NUMERIC" => or_null(row.try_get(index)?, SqlType::Decimal, SqlValue::Decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => {
            or_null(row.try_get(index)?, SqlType::Text, SqlValue::Text)
        }
        "BYTEA" => or_null(row.try_get(index)?, SqlType::Bytes, SqlValue::Bytes),
        "DATE" => or_null(row.try_get(index)?, SqlType::Date, SqlValue::Date),
        "TIME" => or_null(row.try_get(index)?, SqlType::Time, SqlValue::Time),
        "TIMESTAMP" => or_null(row.try_get(index)?, SqlType::Timestamp, SqlValue::Timestamp),
        "TIMESTAMPTZ" => or_null(
            row.try_get(index)?,
            SqlType::TimestampTz,
            SqlValue::TimestampTz,
        ),
        "JSON" | "JSONB" => or_null(row.try_get(index)?, SqlType::Json, SqlValue::Json),
        "UUID" => or_null(row.try_get(index)?, SqlType::Uuid, SqlValue::Uuid),
        // Enums and citext arrive as text on the wire.
        _ if matches!(column.type_info().kind(), PgTypeKind::Enum(_))
            || column.type_info().name().eq_ignore_ascii_case("citext") =>
        {
            or_null(
                row.try_get_unchecked::<Option<String>, _>(index)?,
                SqlType::Text,
                SqlValue::Text,
            )
        }
        other => {
            return Err(Error::UnsupportedType {
                column: column.name().to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(value)
}
