//! Schema introspection and constraint-free replication into the archive.
//!
//! The archive must accept rows whose foreign targets are already gone, so
//! replicated tables carry columns, nullability and the primary key, never
//! foreign keys, checks or defaults. The structured catalog is the primary
//! source; stripping `SHOW CREATE TABLE` text is the MySQL fallback.

use tracing::{debug, info, warn};

use coldstore_core::{ColumnDef, Dialect, Error, RelationalStore, Result, SqlValue, TableSchema};

use crate::report::Replication;
use crate::sql;

// =============================================================================
// INTROSPECTION
// =============================================================================

/// Catalog reads against one store.
pub struct SchemaIntrospector<'a> {
    store: &'a dyn RelationalStore,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(store: &'a dyn RelationalStore) -> Self {
        Self { store }
    }

    fn scope(&self, table: &str) -> [SqlValue; 2] {
        [
            SqlValue::from(self.store.catalog_schema()),
            SqlValue::from(table),
        ]
    }

    /// Whether `table` exists in the store's catalog scope.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self
            .store
            .query(sql::table_exists(self.store.dialect()), &self.scope(table))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Columns and primary key of `table`, or `None` when the catalog knows
    /// no columns for it.
    pub async fn describe(&self, table: &str) -> Result<Option<TableSchema>> {
        let dialect = self.store.dialect();
        let rows = self
            .store
            .query(sql::table_columns(dialect), &self.scope(table))
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = row.get("column_name").and_then(sql::catalog_text);
            let column_type = row.get("column_type").and_then(sql::catalog_text);
            let (Some(name), Some(column_type)) = (name, column_type) else {
                return Err(Error::Internal(format!(
                    "catalog returned an unreadable column row for {}",
                    table
                )));
            };
            let not_null = row
                .get("not_null")
                .and_then(SqlValue::as_bool)
                .unwrap_or(false);
            columns.push(ColumnDef {
                name,
                column_type,
                nullable: !not_null,
            });
        }

        let primary_key = self
            .store
            .query(sql::primary_key_columns(dialect), &self.scope(table))
            .await?
            .iter()
            .filter_map(|row| row.get_index(0).and_then(sql::catalog_text))
            .collect();

        Ok(Some(TableSchema {
            table: table.to_string(),
            columns,
            primary_key,
        }))
    }

    /// Full `CREATE TABLE` text, where the dialect can produce it.
    pub async fn show_create(&self, table: &str) -> Result<Option<String>> {
        let Some(statement) = sql::show_create_table(self.store.dialect(), table) else {
            return Ok(None);
        };
        let rows = self.store.query(&statement, &[]).await?;
        // Second column is the DDL; the first echoes the table name.
        Ok(rows
            .first()
            .and_then(|row| row.get_index(1))
            .and_then(sql::catalog_text))
    }
}

// =============================================================================
// REPLICATION
// =============================================================================

/// Creates missing archive tables from their primary-store definition.
pub struct SchemaReplicator<'a> {
    primary: &'a dyn RelationalStore,
    archive: &'a dyn RelationalStore,
}

impl<'a> SchemaReplicator<'a> {
    pub fn new(primary: &'a dyn RelationalStore, archive: &'a dyn RelationalStore) -> Self {
        Self { primary, archive }
    }

    /// Ensure the archive has `table`. `known` is the primary schema when the
    /// caller already introspected it.
    pub async fn replicate(
        &self,
        table: &str,
        known: Option<&TableSchema>,
    ) -> Result<Replication> {
        if SchemaIntrospector::new(self.archive).table_exists(table).await? {
            debug!(
                subsystem = "archive",
                component = "replicator",
                db_table = table,
                "Archive table already present"
            );
            return Ok(Replication::AlreadyPresent);
        }

        let ddl = self.archive_ddl(table, known).await?;
        self.archive.execute(&ddl, &[]).await?;
        info!(
            subsystem = "archive",
            component = "replicator",
            db_table = table,
            "Archive table created"
        );
        Ok(Replication::Created { ddl })
    }

    /// Like [`replicate`](Self::replicate) but only reports the DDL it would
    /// issue.
    pub async fn plan(&self, table: &str, known: Option<&TableSchema>) -> Result<Replication> {
        if SchemaIntrospector::new(self.archive).table_exists(table).await? {
            return Ok(Replication::AlreadyPresent);
        }
        let ddl = self.archive_ddl(table, known).await?;
        Ok(Replication::Planned { ddl })
    }

    async fn archive_ddl(&self, table: &str, known: Option<&TableSchema>) -> Result<String> {
        let dialect = self.archive.dialect();
        if let Some(schema) = known {
            return create_table_from_schema(dialect, schema);
        }

        let introspector = SchemaIntrospector::new(self.primary);
        let structured = introspector.describe(table).await;
        match structured {
            Ok(Some(schema)) => return create_table_from_schema(dialect, &schema),
            Ok(None) => {}
            Err(ref e) if self.primary.dialect().supports_show_create_table() => {
                warn!(
                    subsystem = "archive",
                    component = "replicator",
                    db_table = table,
                    error = %e,
                    "Structured introspection failed, falling back to SHOW CREATE TABLE"
                );
            }
            Err(e) => return Err(e),
        }

        match introspector.show_create(table).await? {
            Some(ddl) => strip_constraints(dialect, table, &ddl),
            None => Err(Error::InvalidInput(format!(
                "table {} not found in {} store",
                table,
                self.primary.name()
            ))),
        }
    }
}

/// `CREATE TABLE` for the archive from a structured schema: every column with
/// its type and nullability, plus the primary key.
pub fn create_table_from_schema(dialect: Dialect, schema: &TableSchema) -> Result<String> {
    if schema.columns.is_empty() {
        return Err(Error::InvalidInput(format!(
            "table {} has no columns",
            schema.table
        )));
    }
    let mut definitions: Vec<String> = schema
        .columns
        .iter()
        .map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", dialect.quote_ident(&c.name), c.column_type, null)
        })
        .collect();
    if !schema.primary_key.is_empty() {
        let key = schema
            .primary_key
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        definitions.push(format!("PRIMARY KEY ({})", key));
    }
    Ok(sql::create_table(dialect, &schema.table, &definitions))
}

// =============================================================================
// TEXTUAL FALLBACK
// =============================================================================

/// Rewrite `CREATE TABLE` text without constraint fragments. Table options
/// after the closing parenthesis are kept.
pub fn strip_constraints(dialect: Dialect, table: &str, ddl: &str) -> Result<String> {
    let (open, close) = definition_bounds(ddl).ok_or_else(|| {
        Error::InvalidInput(format!("unrecognised CREATE TABLE text for {}", table))
    })?;
    let body = &ddl[open + 1..close];
    let options = ddl[close + 1..].trim();

    let kept: Vec<String> = split_definitions(body)
        .into_iter()
        .filter(|fragment| !is_constraint(fragment))
        .collect();
    if kept.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no column definitions left for {} after stripping constraints",
            table
        )));
    }

    let mut statement = sql::create_table(dialect, table, &kept);
    if !options.is_empty() {
        statement.push(' ');
        statement.push_str(options);
    }
    Ok(statement)
}

/// Split a definition body on top-level commas. Commas inside parentheses or
/// quoted text do not split.
pub fn split_definitions(body: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in body.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                // A doubled quote closes and reopens, which nets out.
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    push_fragment(&mut fragments, &current);
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    push_fragment(&mut fragments, &current);
    fragments
}

fn push_fragment(fragments: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

/// Keywords are only matched outside quoted names, comments and defaults.
fn is_constraint(fragment: &str) -> bool {
    let upper = unquoted(fragment).to_ascii_uppercase();
    upper.starts_with("CONSTRAINT")
        || upper.starts_with("FOREIGN KEY")
        || upper.starts_with("CHECK ")
        || upper.starts_with("CHECK(")
        || upper.contains(" CONSTRAINT ")
        || upper.contains(" REFERENCES ")
}

/// `fragment` with the contents of every quoted span removed. The quote
/// characters stay so word boundaries are kept.
fn unquoted(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut quote: Option<char> = None;
    for ch in fragment.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                out.push(ch);
            }
            Some(_) => {}
            None => {
                if matches!(ch, '\'' | '"' | '`') {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

/// Byte offsets of the parentheses enclosing the definition list.
pub(crate) fn definition_bounds(ddl: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut open = None;

    for (i, ch) in ddl.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' => {
                if depth == 0 && open.is_none() {
                    open = Some(i);
                }
                depth += 1;
            }
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return open.map(|o| (o, i));
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    const MYSQL_ORDERS: &str = "CREATE TABLE `orders_2023` (
  `id` int NOT NULL AUTO_INCREMENT,
  `customer_id` int NOT NULL,
  `total` decimal(10,2) DEFAULT NULL,
  `note` varchar(64) DEFAULT 'a, b',
  `created_at` datetime NOT NULL,
  PRIMARY KEY (`id`),
  KEY `orders_customer` (`customer_id`),
  CONSTRAINT `orders_customer_fk` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

    #[test]
    fn test_strip_drops_foreign_key_keeps_column() {
        let ddl = "CREATE TABLE t (a int, FOREIGN KEY (a) REFERENCES other (id))";
        let stripped = strip_constraints(Dialect::MySql, "t", ddl).unwrap();
        assert_eq!(stripped, "CREATE TABLE `t` (a int)");
        assert!(!stripped.contains("REFERENCES"));
    }

    #[test]
    fn test_strip_mysql_show_create_output() {
        let stripped = strip_constraints(Dialect::MySql, "orders_2023", MYSQL_ORDERS).unwrap();
        assert!(stripped.starts_with("CREATE TABLE `orders_2023` (`id` int NOT NULL AUTO_INCREMENT, "));
        assert!(stripped.contains("`total` decimal(10,2) DEFAULT NULL"));
        assert!(stripped.contains("`note` varchar(64) DEFAULT 'a, b'"));
        assert!(stripped.contains("PRIMARY KEY (`id`)"));
        assert!(stripped.contains("KEY `orders_customer` (`customer_id`)"));
        assert!(!stripped.contains("CONSTRAINT"));
        assert!(!stripped.contains("REFERENCES"));
        assert!(stripped.ends_with(") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_strip_drops_inline_references_and_checks() {
        let ddl = "CREATE TABLE t (id int, owner int REFERENCES users (id), qty int, CHECK (qty > 0))";
        let stripped = strip_constraints(Dialect::Postgres, "t", ddl).unwrap();
        assert_eq!(stripped, "CREATE TABLE \"t\" (id int, qty int)");
    }

    #[test]
    fn test_strip_ignores_keywords_inside_quotes() {
        let ddl = "CREATE TABLE `notes` (
  `id` bigint NOT NULL,
  `note` varchar(64) DEFAULT NULL COMMENT 'see REFERENCES doc',
  `status` varchar(16) DEFAULT ' CONSTRAINT ',
  `REFERENCES` int,
  CONSTRAINT `notes_fk` FOREIGN KEY (`id`) REFERENCES `docs` (`id`),
  PRIMARY KEY (`id`)
)";
        let out = strip_constraints(Dialect::MySql, "notes", ddl).unwrap();
        assert!(out.contains("`note` varchar(64)"), "{}", out);
        assert!(out.contains("`status`"), "{}", out);
        assert!(out.contains("`REFERENCES` int"), "{}", out);
        assert!(!out.contains("notes_fk"), "{}", out);
    }

    #[test]
    fn test_strip_rejects_text_without_body() {
        assert!(strip_constraints(Dialect::MySql, "t", "CREATE VIEW t AS SELECT 1").is_err());
        assert!(strip_constraints(Dialect::MySql, "t", "CREATE TABLE t (CONSTRAINT c CHECK (1))").is_err());
    }

    #[test]
    fn test_split_definitions_respects_nesting_and_quotes() {
        let parts = split_definitions("a numeric(10,2), b text DEFAULT 'x,y', `c,d` int, e enum('p','q')");
        assert_eq!(
            parts,
            vec![
                "a numeric(10,2)",
                "b text DEFAULT 'x,y'",
                "`c,d` int",
                "e enum('p','q')"
            ]
        );
    }

    #[test]
    fn test_create_table_from_schema() {
        let schema = TableSchema {
            table: "orders".to_string(),
            columns: vec![
                ColumnDef {
                    name: "id".to_string(),
                    column_type: "bigint".to_string(),
                    nullable: false,
                },
                ColumnDef {
                    name: "total".to_string(),
                    column_type: "numeric(10,2)".to_string(),
                    nullable: true,
                },
            ],
            primary_key: vec!["id".to_string()],
        };
        assert_eq!(
            create_table_from_schema(Dialect::Postgres, &schema).unwrap(),
            "CREATE TABLE \"orders\" (\"id\" bigint NOT NULL, \"total\" numeric(10,2), PRIMARY KEY (\"id\"))"
        );
    }

    #[tokio::test]
    async fn test_introspector_describe() {
        let store = MemoryStore::new("primary").with_table("orders", &["id", "created_at"]);
        let introspector = SchemaIntrospector::new(&store);

        assert!(introspector.table_exists("orders").await.unwrap());
        assert!(!introspector.table_exists("invoices").await.unwrap());

        let schema = introspector.describe("orders").await.unwrap().unwrap();
        assert_eq!(schema.primary_key, vec!["id"]);
        assert!(schema.has_column("created_at"));
        assert!(!schema.columns[0].nullable);
        assert!(introspector.describe("invoices").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replicate_creates_missing_table() {
        let primary = MemoryStore::new("primary").with_table("orders", &["id", "created_at"]);
        let archive = MemoryStore::new("archive");

        let outcome = SchemaReplicator::new(&primary, &archive)
            .replicate("orders", None)
            .await
            .unwrap();
        match outcome {
            Replication::Created { ddl } => assert!(ddl.starts_with("CREATE TABLE \"orders\"")),
            other => panic!("Expected Created, got {:?}", other),
        }
        assert!(archive.has_table("orders"));
    }

    #[tokio::test]
    async fn test_replicate_is_noop_when_present() {
        let primary = MemoryStore::new("primary").with_table("orders", &["id"]);
        let archive = MemoryStore::new("archive").with_table("orders", &["id"]);

        let outcome = SchemaReplicator::new(&primary, &archive)
            .replicate("orders", None)
            .await
            .unwrap();
        assert_eq!(outcome, Replication::AlreadyPresent);
        assert!(archive
            .statements()
            .iter()
            .all(|s| !s.starts_with("CREATE TABLE")));
    }

    #[tokio::test]
    async fn test_replicate_falls_back_to_show_create_on_mysql() {
        let primary = MemoryStore::new("primary")
            .with_dialect(Dialect::MySql, "app")
            .with_table("orders_2023", &["id", "customer_id", "total", "note", "created_at"])
            .with_show_create("orders_2023", MYSQL_ORDERS)
            .fail_when("information_schema.COLUMNS");
        let archive = MemoryStore::new("archive").with_dialect(Dialect::MySql, "app_archive");

        let outcome = SchemaReplicator::new(&primary, &archive)
            .replicate("orders_2023", None)
            .await
            .unwrap();
        let Replication::Created { ddl } = outcome else {
            panic!("Expected Created");
        };
        assert!(ddl.contains("`customer_id` int NOT NULL"));
        assert!(!ddl.contains("FOREIGN KEY"));
        assert!(archive.has_table("orders_2023"));
    }

    #[tokio::test]
    async fn test_replicate_fails_on_postgres_catalog_error() {
        let primary = MemoryStore::new("primary")
            .with_table("orders", &["id"])
            .fail_when("format_type");
        let archive = MemoryStore::new("archive");

        let result = SchemaReplicator::new(&primary, &archive)
            .replicate("orders", None)
            .await;
        assert!(result.is_err());
        assert!(!archive.has_table("orders"));
    }

    #[tokio::test]
    async fn test_plan_issues_no_ddl() {
        let primary = MemoryStore::new("primary").with_table("orders", &["id"]);
        let archive = MemoryStore::new("archive");

        let outcome = SchemaReplicator::new(&primary, &archive)
            .plan("orders", None)
            .await
            .unwrap();
        assert!(matches!(outcome, Replication::Planned { .. }));
        assert!(!archive.has_table("orders"));
    }
}
