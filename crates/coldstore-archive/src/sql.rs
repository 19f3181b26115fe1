//! Statements issued by the engine, rendered per dialect.
//!
//! Identifiers are always quoted; values are always bound as parameters.

use coldstore_core::defaults::WATERMARK_COLUMN;
use coldstore_core::{Dialect, SqlValue, TableSchema};

/// Base tables in a catalog scope whose name matches a LIKE pattern.
/// Params: `[schema, pattern]`.
pub fn list_tables(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT table_name::text AS table_name \
             FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' AND table_name LIKE $2 \
             ORDER BY table_name"
        }
        Dialect::MySql => {
            "SELECT TABLE_NAME AS table_name \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME LIKE ? \
             ORDER BY TABLE_NAME"
        }
    }
}

/// One row if the table exists in the catalog scope.
/// Params: `[schema, table]`.
pub fn table_exists(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT 1 AS present FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2 LIMIT 1"
        }
        Dialect::MySql => {
            "SELECT 1 AS present FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? LIMIT 1"
        }
    }
}

/// Columns of a table in ordinal order as `(column_name, column_type, not_null)`.
/// Params: `[schema, table]`.
pub fn table_columns(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT a.attname::text AS column_name, \
                    format_type(a.atttypid, a.atttypmod) AS column_type, \
                    a.attnotnull AS not_null \
             FROM pg_attribute a \
             JOIN pg_class c ON a.attrelid = c.oid \
             JOIN pg_namespace n ON c.relnamespace = n.oid \
             WHERE n.nspname = $1 AND c.relname = $2 \
               AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum"
        }
        Dialect::MySql => {
            "SELECT COLUMN_NAME AS column_name, \
                    COLUMN_TYPE AS column_type, \
                    IS_NULLABLE = 'NO' AS not_null \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION"
        }
    }
}

/// Primary-key columns of a table in key order as `(column_name)`.
/// Params: `[schema, table]`.
pub fn primary_key_columns(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => {
            "SELECT a.attname::text AS column_name \
             FROM pg_index i \
             JOIN pg_class c ON i.indrelid = c.oid \
             JOIN pg_namespace n ON c.relnamespace = n.oid \
             JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
             WHERE n.nspname = $1 AND c.relname = $2 AND i.indisprimary \
             ORDER BY array_position(i.indkey::int2[], a.attnum)"
        }
        Dialect::MySql => {
            "SELECT COLUMN_NAME AS column_name \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY ORDINAL_POSITION"
        }
    }
}

/// Full DDL text of a table, where the dialect can produce it.
pub fn show_create_table(dialect: Dialect, table: &str) -> Option<String> {
    dialect
        .supports_show_create_table()
        .then(|| format!("SHOW CREATE TABLE {}", dialect.quote_ident(table)))
}

/// `CREATE TABLE` from already rendered definition fragments.
pub fn create_table(dialect: Dialect, table: &str, definitions: &[String]) -> String {
    format!(
        "CREATE TABLE {} ({})",
        dialect.quote_ident(table),
        definitions.join(", ")
    )
}

/// Highest watermark-column value in a table.
pub fn max_watermark(dialect: Dialect, table: &str) -> String {
    let id = dialect.quote_ident(WATERMARK_COLUMN);
    format!(
        "SELECT {id} FROM {} ORDER BY {id} DESC LIMIT 1",
        dialect.quote_ident(table)
    )
}

/// Select list for a table: `*` unless some column has to travel as text,
/// in which case every column is listed and those are cast to `text`.
pub fn projection(dialect: Dialect, schema: Option<&TableSchema>) -> String {
    let Some(schema) = schema else {
        return "*".to_string();
    };
    if !schema
        .columns
        .iter()
        .any(|c| dialect.needs_text_cast(&c.column_type))
    {
        return "*".to_string();
    }
    schema
        .columns
        .iter()
        .map(|c| {
            let name = dialect.quote_ident(&c.name);
            if dialect.needs_text_cast(&c.column_type) {
                format!("{name}::text AS {name}")
            } else {
                name
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-column cast applied to insert placeholders, aligned with `columns`.
/// Only columns selected as text by [`projection`] get one.
pub fn column_casts(
    dialect: Dialect,
    schema: Option<&TableSchema>,
    columns: &[String],
) -> Vec<Option<String>> {
    columns
        .iter()
        .map(|name| {
            schema?
                .columns
                .iter()
                .find(|c| &c.name == name)
                .filter(|c| dialect.needs_text_cast(&c.column_type))
                .map(|c| c.column_type.clone())
        })
        .collect()
}

/// Rows older than the cutoff and past the watermark, in key order.
/// Params: `[cutoff, watermark]`.
pub fn select_eligible(
    dialect: Dialect,
    table: &str,
    date_column: &str,
    projection: &str,
) -> String {
    let id = dialect.quote_ident(WATERMARK_COLUMN);
    format!(
        "SELECT {} FROM {} WHERE {} < {} AND {id} > {} ORDER BY {id}",
        projection,
        dialect.quote_ident(table),
        dialect.quote_ident(date_column),
        dialect.placeholder(1),
        dialect.placeholder(2),
    )
}

/// Multi-row insert of `row_count` tuples over `columns`. Params are the
/// tuples flattened in row order.
pub fn insert_rows(
    dialect: Dialect,
    table: &str,
    columns: &[String],
    casts: &[Option<String>],
    row_count: usize,
) -> String {
    let column_list = columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let tuples = (0..row_count)
        .map(|row| {
            let values = (0..columns.len())
                .map(|i| {
                    let placeholder = dialect.placeholder(row * columns.len() + i + 1);
                    match casts.get(i).and_then(Option::as_deref) {
                        Some(ty) => format!("CAST({} AS {})", placeholder, ty),
                        None => placeholder,
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        dialect.quote_ident(table),
        column_list,
        tuples
    )
}

/// Text of a catalog value. Some MySQL servers report catalog names as
/// binary strings.
pub fn catalog_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
        _ => None,
    }
}
