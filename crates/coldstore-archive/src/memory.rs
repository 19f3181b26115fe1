//! In-memory store for deterministic engine tests.
//!
//! Understands exactly the statements the engine emits (catalog lookups,
//! watermark and eligibility selects, `CREATE TABLE`, multi-row inserts) in
//! either dialect. Anything else is an `Unsupported` error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use coldstore_archive::memory::MemoryStore;
//!
//! let primary = MemoryStore::new("primary")
//!     .with_table("orders_2023", &["id", "created_at"])
//!     .with_table("invoices", &["id", "created_at"]);
//! assert!(primary.has_table("orders_2023"));
//! ```
//!
//! Clones share state, so a test can hand one clone to the engine and
//! inspect another.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use coldstore_core::defaults::WATERMARK_COLUMN;
use coldstore_core::{
    ColumnDef, Dialect, Error, RelationalStore, Result, RowRecord, SqlValue, Statement,
    TableSchema,
};

use crate::schema::{definition_bounds, split_definitions};

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    rows: Vec<RowRecord>,
    show_create: Option<String>,
}

impl MemTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    statements: Vec<String>,
    failures: Vec<String>,
    poisoned_ids: HashSet<i64>,
}

/// [`RelationalStore`] holding tables in memory.
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    dialect: Dialect,
    schema: String,
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Empty PostgreSQL-flavoured store scoped to schema `public`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dialect: Dialect::Postgres,
            schema: "public".to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Speak `dialect` and scope catalog lookups to `schema`.
    pub fn with_dialect(mut self, dialect: Dialect, schema: &str) -> Self {
        self.dialect = dialect;
        self.schema = schema.to_string();
        self
    }

    /// Add a table. `id` becomes a non-null `bigint` primary key; every other
    /// column is nullable `text`.
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .map(|name| ColumnDef {
                name: name.to_string(),
                column_type: if *name == WATERMARK_COLUMN { "bigint" } else { "text" }.to_string(),
                nullable: *name != WATERMARK_COLUMN,
            })
            .collect::<Vec<_>>();
        let primary_key = columns
            .iter()
            .filter(|c| c.name == WATERMARK_COLUMN)
            .map(|c| c.name.clone())
            .collect();
        self.with_schema(TableSchema {
            table: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// Add a table with an explicit definition.
    pub fn with_schema(self, schema: TableSchema) -> Self {
        self.lock().tables.insert(
            schema.table,
            MemTable {
                columns: schema.columns,
                primary_key: schema.primary_key,
                rows: Vec::new(),
                show_create: None,
            },
        );
        self
    }

    /// DDL text returned by `SHOW CREATE TABLE` for `table`.
    pub fn with_show_create(self, table: &str, ddl: &str) -> Self {
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.show_create = Some(ddl.to_string());
        }
        self
    }

    /// Fail every statement containing `fragment`.
    pub fn fail_when(self, fragment: &str) -> Self {
        self.lock().failures.push(fragment.to_string());
        self
    }

    /// Reject any insert that carries this `id`, failing the whole call.
    pub fn poison_id(self, id: i64) -> Self {
        self.lock().poisoned_ids.insert(id);
        self
    }

    /// Append rows directly, bypassing statement handling. A missing table is
    /// created from the first row's columns.
    pub fn insert_rows(&self, table: &str, rows: Vec<RowRecord>) {
        let mut state = self.lock();
        let entry = state.tables.entry(table.to_string()).or_insert_with(|| MemTable {
            columns: rows
                .first()
                .map(|r| {
                    r.columns()
                        .iter()
                        .map(|name| ColumnDef {
                            name: name.clone(),
                            column_type: "text".to_string(),
                            nullable: true,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            primary_key: Vec::new(),
            rows: Vec::new(),
            show_create: None,
        });
        entry.rows.extend(rows);
    }

    /// Rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<RowRecord> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn clear_statements(&self) {
        self.lock().statements.clear()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Log `sql` and apply injected failures.
    fn record(&self, state: &mut State, sql: &str) -> Result<()> {
        state.statements.push(sql.to_string());
        if let Some(fragment) = state.failures.iter().find(|f| sql.contains(f.as_str())) {
            return Err(Error::Internal(format!(
                "{} store rejected statement matching `{}`",
                self.name, fragment
            )));
        }
        Ok(())
    }

    fn in_scope(&self, params: &[SqlValue]) -> bool {
        params.first().and_then(SqlValue::as_str) == Some(self.schema.as_str())
    }

    fn run_query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowRecord>> {
        let mut state = self.lock();
        self.record(&mut state, sql)?;
        let upper = sql.trim_start().to_ascii_uppercase();

        if upper.starts_with("SHOW CREATE TABLE") {
            let table = first_ident(sql)?;
            let ddl = state
                .tables
                .get(&table)
                .ok_or_else(|| missing_table(&table))?
                .show_create
                .clone()
                .ok_or_else(|| Error::Unsupported(format!("no DDL text for {}", table)))?;
            return Ok(vec![RowRecord::from_pairs([
                ("Table", SqlValue::Text(table)),
                ("Create Table", SqlValue::Text(ddl)),
            ])]);
        }

        if sql.contains("format_type") || sql.contains("information_schema.COLUMNS") {
            let table = param_text(params, 1)?;
            let Some(t) = state.tables.get(&table).filter(|_| self.in_scope(params)) else {
                return Ok(Vec::new());
            };
            let columns: Arc<[String]> =
                ["column_name", "column_type", "not_null"].map(String::from).into();
            return Ok(t
                .columns
                .iter()
                .map(|c| {
                    let not_null = match self.dialect {
                        Dialect::Postgres => SqlValue::Bool(!c.nullable),
                        Dialect::MySql => SqlValue::Int(i64::from(!c.nullable)),
                    };
                    RowRecord::new(
                        Arc::clone(&columns),
                        vec![
                            SqlValue::Text(c.name.clone()),
                            SqlValue::Text(c.column_type.clone()),
                            not_null,
                        ],
                    )
                })
                .collect());
        }

        if sql.contains("indisprimary") || sql.contains("KEY_COLUMN_USAGE") {
            let table = param_text(params, 1)?;
            let Some(t) = state.tables.get(&table).filter(|_| self.in_scope(params)) else {
                return Ok(Vec::new());
            };
            return Ok(t
                .primary_key
                .iter()
                .map(|c| RowRecord::from_pairs([("column_name", SqlValue::Text(c.clone()))]))
                .collect());
        }

        if upper.contains("INFORMATION_SCHEMA.TABLES") {
            if !self.in_scope(params) {
                return Ok(Vec::new());
            }
            if upper.contains(" LIKE ") {
                let pattern = like_regex(&param_text(params, 1)?)?;
                return Ok(state
                    .tables
                    .keys()
                    .filter(|name| pattern.is_match(name))
                    .map(|name| {
                        RowRecord::from_pairs([("table_name", SqlValue::Text(name.clone()))])
                    })
                    .collect());
            }
            let table = param_text(params, 1)?;
            return Ok(if state.tables.contains_key(&table) {
                vec![RowRecord::from_pairs([("present", SqlValue::Int(1))])]
            } else {
                Vec::new()
            });
        }

        if upper.contains(" DESC LIMIT 1") {
            let idents = idents(sql);
            let (Some(column), Some(table)) = (idents.first(), idents.get(1)) else {
                return Err(Error::Unsupported(sql.to_string()));
            };
            let t = state.tables.get(table).ok_or_else(|| missing_table(table))?;
            if !t.has_column(column) {
                return Err(missing_column(table, column));
            }
            let highest = t.rows.iter().filter_map(|r| r.get(column)?.as_i64()).max();
            return Ok(highest
                .map(|id| vec![RowRecord::from_pairs([(column.clone(), SqlValue::Int(id))])])
                .unwrap_or_default());
        }

        if upper.starts_with("SELECT * FROM") {
            let idents = idents(sql);
            let (Some(table), Some(date_column), Some(id_column)) =
                (idents.first(), idents.get(1), idents.get(2))
            else {
                return Err(Error::Unsupported(sql.to_string()));
            };
            let t = state.tables.get(table).ok_or_else(|| missing_table(table))?;
            for column in [date_column, id_column] {
                if !t.has_column(column) {
                    return Err(missing_column(table, column));
                }
            }
            let cutoff = params
                .first()
                .and_then(SqlValue::as_instant)
                .ok_or_else(|| Error::InvalidInput("cutoff parameter missing".to_string()))?;
            let watermark = params
                .get(1)
                .and_then(SqlValue::as_i64)
                .ok_or_else(|| Error::InvalidInput("watermark parameter missing".to_string()))?;

            let mut rows: Vec<RowRecord> = t
                .rows
                .iter()
                .filter(|r| {
                    let old = r
                        .get(date_column)
                        .and_then(SqlValue::as_instant)
                        .is_some_and(|ts| ts < cutoff);
                    let fresh = r
                        .get(id_column)
                        .and_then(SqlValue::as_i64)
                        .is_some_and(|id| id > watermark);
                    old && fresh
                })
                .cloned()
                .collect();
            rows.sort_by_key(|r| r.get(id_column).and_then(SqlValue::as_i64));
            return Ok(rows);
        }

        Err(Error::Unsupported(format!("memory store cannot run: {}", sql)))
    }

    fn run_statement(&self, state: &mut State, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.record(state, sql)?;
        let upper = sql.trim_start().to_ascii_uppercase();

        if upper.starts_with("CREATE TABLE") {
            let table = first_ident(sql)?;
            if state.tables.contains_key(&table) {
                return Err(Error::InvalidInput(format!(
                    "relation \"{}\" already exists",
                    table
                )));
            }
            let parsed = parse_create(&table, sql)?;
            state.tables.insert(table, parsed);
            return Ok(0);
        }

        if upper.starts_with("INSERT INTO") {
            let mut idents = idents(sql).into_iter();
            let table = idents
                .next()
                .ok_or_else(|| Error::Unsupported(sql.to_string()))?;
            let columns: Arc<[String]> = idents.collect();
            let State {
                tables,
                poisoned_ids,
                ..
            } = state;
            let t = tables.get_mut(&table).ok_or_else(|| missing_table(&table))?;

            if let Some(unknown) = columns.iter().find(|c| !t.has_column(c)) {
                return Err(missing_column(&table, unknown));
            }
            let id_position = columns.iter().position(|c| c == WATERMARK_COLUMN);
            let keyed = t.primary_key.iter().any(|c| c == WATERMARK_COLUMN);
            let mut seen: HashSet<i64> = t
                .rows
                .iter()
                .filter_map(|r| r.get(WATERMARK_COLUMN)?.as_i64())
                .collect();

            if columns.is_empty() || params.len() % columns.len() != 0 {
                return Err(Error::InvalidInput(format!(
                    "insert expects a multiple of {} values, got {}",
                    columns.len(),
                    params.len()
                )));
            }
            let tuples: Vec<&[SqlValue]> = params.chunks(columns.len()).collect();

            // Validate everything before applying anything.
            for tuple in &tuples {
                let Some(id) = id_position.and_then(|i| tuple[i].as_i64()) else {
                    continue;
                };
                if poisoned_ids.contains(&id) {
                    return Err(Error::InvalidInput(format!(
                        "value rejected for {}.{} = {}",
                        table, WATERMARK_COLUMN, id
                    )));
                }
                if keyed && !seen.insert(id) {
                    return Err(Error::InvalidInput(format!(
                        "duplicate key value violates unique constraint: {}.{} = {}",
                        table, WATERMARK_COLUMN, id
                    )));
                }
            }

            t.rows.extend(
                tuples
                    .iter()
                    .map(|tuple| RowRecord::new(Arc::clone(&columns), tuple.to_vec())),
            );
            return Ok(tuples.len() as u64);
        }

        Err(Error::Unsupported(format!("memory store cannot run: {}", sql)))
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn catalog_schema(&self) -> &str {
        &self.schema
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowRecord>> {
        self.run_query(sql, params)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut state = self.lock();
        self.run_statement(&mut state, sql, params)
    }

    async fn execute_many(&self, statements: &[Statement]) -> Result<u64> {
        let mut state = self.lock();
        let snapshot = state.tables.clone();
        let mut affected = 0;
        for statement in statements {
            match self.run_statement(&mut state, &statement.sql, &statement.params) {
                Ok(n) => affected += n,
                Err(e) => {
                    state.tables = snapshot;
                    return Err(e);
                }
            }
        }
        Ok(affected)
    }
}

fn missing_table(table: &str) -> Error {
    Error::InvalidInput(format!("relation \"{}\" does not exist", table))
}

fn missing_column(table: &str, column: &str) -> Error {
    Error::InvalidInput(format!("column \"{}\" of \"{}\" does not exist", column, table))
}

fn param_text(params: &[SqlValue], index: usize) -> Result<String> {
    params
        .get(index)
        .and_then(SqlValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("text parameter {} missing", index + 1)))
}

/// Quoted identifiers in statement order.
fn idents(sql: &str) -> Vec<String> {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    let re = QUOTED.get_or_init(|| Regex::new(r#"["`]([^"`]+)["`]"#).expect("static regex"));
    re.captures_iter(sql).map(|c| c[1].to_string()).collect()
}

fn first_ident(sql: &str) -> Result<String> {
    idents(sql)
        .into_iter()
        .next()
        .ok_or_else(|| Error::Unsupported(sql.to_string()))
}

/// Anchored regex for a LIKE pattern with backslash escapes.
fn like_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            _ => out.push_str(&regex::escape(&ch.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Table definition from `CREATE TABLE` text: plain column definitions and a
/// `PRIMARY KEY (...)` clause. Index clauses are ignored.
fn parse_create(table: &str, sql: &str) -> Result<MemTable> {
    let (open, close) = definition_bounds(sql)
        .ok_or_else(|| Error::InvalidInput(format!("malformed CREATE TABLE for {}", table)))?;
    let mut columns = Vec::new();
    let mut primary_key = Vec::new();

    for fragment in split_definitions(&sql[open + 1..close]) {
        let upper = fragment.to_ascii_uppercase();
        if upper.starts_with("PRIMARY KEY") {
            primary_key = idents(&fragment);
            continue;
        }
        if ["KEY ", "UNIQUE", "INDEX ", "FULLTEXT"]
            .iter()
            .any(|p| upper.starts_with(p))
        {
            continue;
        }
        let (name, rest) = match fragment.chars().next() {
            Some(q @ ('"' | '`')) => {
                let end = fragment[1..].find(q).map(|i| i + 1).ok_or_else(|| {
                    Error::InvalidInput(format!("unterminated name in {}", fragment))
                })?;
                (fragment[1..end].to_string(), fragment[end + 1..].trim().to_string())
            }
            _ => {
                let (name, rest) = fragment
                    .split_once(char::is_whitespace)
                    .unwrap_or((fragment.as_str(), ""));
                (name.to_string(), rest.trim().to_string())
            }
        };
        let nullable = !rest.to_ascii_uppercase().contains("NOT NULL");
        let column_type = rest.split_whitespace().next().unwrap_or_default().to_string();
        columns.push(ColumnDef {
            name,
            column_type,
            nullable,
        });
    }

    if columns.is_empty() {
        return Err(Error::InvalidInput(format!("no columns for {}", table)));
    }
    Ok(MemTable {
        columns,
        primary_key,
        rows: Vec::new(),
        show_create: None,
    })
}
