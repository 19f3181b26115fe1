//! # coldstore-db
//!
//! sqlx-backed [`RelationalStore`] implementations for coldstore.
//!
//! This crate provides:
//! - Connection pool management for PostgreSQL and MySQL
//! - [`PgStore`] and [`MySqlStore`], which run the engine's SQL and
//!   materialize dynamically shaped rows
//! - [`connect_store`], which picks the implementation from the URL scheme
//!
//! ## Example
//!
//! ```rust,ignore
//! use coldstore_db::{connect_store, PoolConfig};
//!
//! let primary = connect_store("primary", "mysql://app@db/app", &PoolConfig::default(), None).await?;
//! let rows = primary.query("SELECT 1 AS one", &[]).await?;
//! ```

pub mod mysql;
pub mod pool;
pub mod postgres;

use std::sync::Arc;

use tracing::info;

pub use coldstore_core::*;

pub use mysql::MySqlStore;
pub use pool::{create_mysql_pool_with_config, create_pg_pool_with_config, PoolConfig};
pub use postgres::PgStore;

/// Leading part of a statement for logs: multi-row inserts are cut before
/// their `VALUES` list.
pub(crate) fn statement_head(sql: &str) -> &str {
    sql.split(" VALUES ").next().unwrap_or(sql)
}

/// Connect to the store at `database_url`, choosing the implementation from
/// the URL scheme. `schema` overrides the catalog scope.
pub async fn connect_store(
    name: &str,
    database_url: &str,
    config: &PoolConfig,
    schema: Option<String>,
) -> Result<Arc<dyn RelationalStore>> {
    let dialect = Dialect::from_url(database_url).ok_or_else(|| {
        Error::Config(format!(
            "{} database URL must start with postgres://, postgresql://, mysql:// or mariadb://",
            name
        ))
    })?;

    let store: Arc<dyn RelationalStore> = match dialect {
        Dialect::Postgres => Arc::new(PgStore::connect(name, database_url, config, schema).await?),
        Dialect::MySql => Arc::new(MySqlStore::connect(name, database_url, config, schema).await?),
    };

    info!(
        subsystem = "db",
        store = name,
        dialect = %dialect,
        catalog_schema = store.catalog_schema(),
        "Store connected"
    );
    Ok(store)
}
