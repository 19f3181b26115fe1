//! Centralized default constants for coldstore.
//!
//! Every crate references these constants instead of defining its own magic
//! numbers.

// =============================================================================
// ARCHIVAL
// =============================================================================

/// Maximum number of rows inserted into the archive per chunk.
pub const BATCH_SIZE: usize = 10_000;

/// Integer primary-key column used as the resume cursor (watermark).
pub const WATERMARK_COLUMN: &str = "id";

/// Watermark used when the archive holds nothing for a table yet.
pub const INITIAL_WATERMARK: i64 = 0;

/// Most bind parameters one statement may carry. PostgreSQL and MySQL both
/// count them in a 16-bit field.
pub const MAX_BIND_PARAMS: usize = 65_535;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Jobs file read when neither `--config` nor `ARCHIVE_CONFIG` is given.
pub const CONFIG_PATH: &str = "archive.yaml";

/// Name of the store rows are archived from.
pub const PRIMARY_STORE: &str = "primary";

/// Name of the store rows are archived into.
pub const ARCHIVE_STORE: &str = "archive";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum connections per store. The engine runs one query at a time per
/// store, so a small pool is enough.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Seconds to wait for a pooled connection.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle pooled connection is closed.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;
