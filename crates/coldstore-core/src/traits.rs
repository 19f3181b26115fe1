//! The capability the archival engine needs from a database.
//!
//! The engine treats each store as an opaque SQL-speaking endpoint and never
//! manages its connection lifecycle. Implementations acquire a connection per
//! call and release it before returning.

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::value::{RowRecord, SqlValue};

/// One SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// A relational store (primary or archive) that can run SQL.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Logical name used in logs ("primary", "archive").
    fn name(&self) -> &str;

    /// SQL dialect of the store.
    fn dialect(&self) -> Dialect;

    /// Schema (PostgreSQL) or database (MySQL) that scopes catalog lookups.
    fn catalog_schema(&self) -> &str;

    /// Run a query and materialize every row, in the order the store
    /// returns them.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowRecord>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run statements in order inside one transaction: either every
    /// statement is applied or none is. Returns the total affected rows.
    async fn execute_many(&self, statements: &[Statement]) -> Result<u64>;
}
