//! SQL dialect differences between the supported stores.

use std::fmt;

use serde::Serialize;

/// SQL dialect spoken by a [`RelationalStore`](crate::RelationalStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Positional placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::MySql => "?".to_string(),
        }
    }

    /// Comma-separated placeholders for parameters `start..start + count`.
    pub fn placeholders(self, start: usize, count: usize) -> String {
        (start..start + count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether values of a catalog-rendered column type have no native
    /// binding and must be selected as text and cast back on insert.
    /// PostgreSQL enums, arrays, ranges, `interval`, `inet` and the like fall
    /// here; every MySQL type binds natively or as text.
    pub fn needs_text_cast(self, column_type: &str) -> bool {
        match self {
            Dialect::MySql => false,
            Dialect::Postgres => !matches!(
                base_type(column_type).as_str(),
                "boolean"
                    | "smallint"
                    | "integer"
                    | "bigint"
                    | "real"
                    | "double precision"
                    | "numeric"
                    | "text"
                    | "character varying"
                    | "character"
                    | "name"
                    | "bytea"
                    | "date"
                    | "time without time zone"
                    | "timestamp without time zone"
                    | "timestamp with time zone"
                    | "json"
                    | "jsonb"
                    | "uuid"
            ),
        }
    }

    /// Whether the store can return a table's full DDL text.
    pub fn supports_show_create_table(self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Dialect implied by a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" | "mariadb" => Some(Dialect::MySql),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
        }
    }
}

/// Type name without modifiers: `numeric(10,2)` is `numeric`,
/// `timestamp(3) with time zone` is `timestamp with time zone`.
fn base_type(column_type: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(column_type.len());
    for ch in column_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch.to_ascii_lowercase()),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape LIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// LIKE pattern matching every name that starts with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    format!("{}%", escape_like(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_postgres() {
        assert_eq!(Dialect::Postgres.quote_ident("orders"), "\"orders\"");
        assert_eq!(Dialect::Postgres.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_ident_mysql() {
        assert_eq!(Dialect::MySql.quote_ident("orders"), "`orders`");
        assert_eq!(Dialect::MySql.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholders(1, 3), "$1, $2, $3");
        assert_eq!(Dialect::MySql.placeholders(1, 3), "?, ?, ?");
        assert_eq!(Dialect::Postgres.placeholders(1, 0), "");
    }

    #[test]
    fn test_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://u:p@localhost/app"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/app"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::from_url("mysql://root@localhost/app"),
            Some(Dialect::MySql)
        );
        assert_eq!(Dialect::from_url("sqlite://app.db"), None);
        assert_eq!(Dialect::from_url("not a url"), None);
    }

    #[test]
    fn test_show_create_support() {
        assert!(Dialect::MySql.supports_show_create_table());
        assert!(!Dialect::Postgres.supports_show_create_table());
    }

    #[test]
    fn test_needs_text_cast() {
        for native in [
            "bigint",
            "numeric(10,2)",
            "character varying(64)",
            "timestamp(3) with time zone",
            "timestamp without time zone",
            "jsonb",
        ] {
            assert!(!Dialect::Postgres.needs_text_cast(native), "{}", native);
        }
        for cast in ["mood", "integer[]", "interval", "inet", "money", "time with time zone"] {
            assert!(Dialect::Postgres.needs_text_cast(cast), "{}", cast);
        }
        assert!(!Dialect::MySql.needs_text_cast("enum('a','b')"));
    }

    #[test]
    fn test_prefix_pattern_escapes_wildcards() {
        assert_eq!(prefix_pattern("orders"), "orders%");
        assert_eq!(prefix_pattern("order_items"), "order\\_items%");
        assert_eq!(prefix_pattern("100%"), "100\\%%");
    }
}
