//! Database connection pool management.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Database, Pool};
use tracing::info;

use coldstore_core::defaults::{DB_CONNECT_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS};
use coldstore_core::{Error, Result};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: 0,
            connect_timeout: Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn apply<DB: Database>(&self, options: PoolOptions<DB>) -> PoolOptions<DB> {
        let options = options
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout);
        match self.max_lifetime {
            Some(max_lifetime) => options.max_lifetime(max_lifetime),
            None => options,
        }
    }
}

/// Create a PostgreSQL connection pool.
pub async fn create_pg_pool_with_config(
    store: &str,
    database_url: &str,
    config: &PoolConfig,
) -> Result<PgPool> {
    let start = Instant::now();
    log_pool_create(store, "postgres", config);

    let pool = config
        .apply(PgPoolOptions::new())
        .connect_with(pg_connect_options(database_url)?)
        .await
        .map_err(Error::Database)?;

    log_pool_established(store, &pool, start);
    Ok(pool)
}

/// Create a MySQL connection pool.
pub async fn create_mysql_pool_with_config(
    store: &str,
    database_url: &str,
    config: &PoolConfig,
) -> Result<MySqlPool> {
    let start = Instant::now();
    log_pool_create(store, "mysql", config);

    let pool = config
        .apply(MySqlPoolOptions::new())
        .connect_with(mysql_connect_options(database_url)?)
        .await
        .map_err(Error::Database)?;

    log_pool_established(store, &pool, start);
    Ok(pool)
}

/// Sessions run in UTC so naive timestamps compare against the cutoff the
/// same way on every server.
fn pg_connect_options(database_url: &str) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(database_url).map_err(Error::Database)?;
    Ok(options.options([("TimeZone", "UTC")]))
}

fn mysql_connect_options(database_url: &str) -> Result<MySqlConnectOptions> {
    let options = MySqlConnectOptions::from_str(database_url).map_err(Error::Database)?;
    Ok(options.timezone(Some(String::from("+00:00"))))
}

fn log_pool_create(store: &str, dialect: &str, config: &PoolConfig) {
    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        store,
        dialect,
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Creating database connection pool"
    );
}

fn log_pool_established<DB: Database>(store: &str, pool: &Pool<DB>, start: Instant) {
    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        store,
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, DB_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_lifetime, Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(2)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(5))
            .max_lifetime(None);

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_lifetime, None);
    }

    #[test]
    fn test_pg_sessions_use_utc() {
        let options = pg_connect_options("postgres://app@localhost:5432/app").unwrap();
        let startup = options.get_options().unwrap_or_default();
        assert!(startup.contains("TimeZone=UTC"), "{}", startup);
    }

    #[test]
    fn test_pg_utc_keeps_url_options() {
        let options =
            pg_connect_options("postgres://app@localhost/app?options=-c%20search_path%3Darchive")
                .unwrap();
        let startup = options.get_options().unwrap_or_default();
        assert!(startup.contains("search_path=archive"), "{}", startup);
        assert!(startup.contains("TimeZone=UTC"), "{}", startup);
    }

    #[test]
    fn test_malformed_url_is_rejected() {
        assert!(pg_connect_options("postgres://app@localhost:notaport/app").is_err());
        assert!(mysql_connect_options("mysql://app@localhost:notaport/app").is_err());
    }
}
