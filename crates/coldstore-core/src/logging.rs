//! Structured logging schema and field name constants for coldstore.
//!
//! All crates use these names for structured logging fields so that log
//! aggregation can query archival runs consistently.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Work lost for a table or chunk, requires operator attention |
//! | WARN  | Skipped job entry, automatic fallback applied |
//! | INFO  | Run and table banners, row counts |
//! | DEBUG | Executed SQL, decision points |
//! | TRACE | Per-chunk detail |

use std::sync::OnceLock;

use regex::Regex;

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "archive", "db", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "discovery", "replicator", "watermark", "extractor", "loader"
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

/// Store the event concerns ("primary" or "archive").
pub const STORE: &str = "store";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Table being processed.
pub const DB_TABLE: &str = "db_table";

/// Table-name pattern of the job entry being processed.
pub const TABLE_PATTERN: &str = "table_pattern";

/// Date column compared against the cutoff.
pub const DATE_COLUMN: &str = "date_column";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows read or written.
pub const ROW_COUNT: &str = "row_count";

/// Zero-based chunk index within a load.
pub const CHUNK_INDEX: &str = "chunk_index";

/// Resume cursor for a table.
pub const WATERMARK: &str = "watermark";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Collapse runs of whitespace to a single space, for single-line SQL logs.
pub fn normalize_spaces(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(text.trim(), " ").into_owned()
}
