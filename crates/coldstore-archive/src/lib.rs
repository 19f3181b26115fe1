//! # coldstore-archive
//!
//! The incremental cold-storage archival engine.
//!
//! For every job spec the [`Archiver`] discovers matching primary tables and,
//! one table at a time:
//!
//! 1. checks the table has the `id` watermark column and the date column
//! 2. creates the archive table without constraints if it is missing
//! 3. resolves the watermark (highest archived id, zero if none)
//! 4. extracts rows older than the cutoff and past the watermark
//! 5. loads them into the archive in chunk-isolated batches
//!
//! ## Example
//!
//! ```rust,ignore
//! use coldstore_archive::{Archiver, ArchiverConfig};
//!
//! let archiver = Archiver::new(primary, archive, ArchiverConfig::default())?;
//! let report = archiver.run(&jobs.tables).await;
//! println!("{}", report.render_text());
//! ```

pub mod archiver;
pub mod discovery;
pub mod extract;
pub mod loader;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod report;
pub mod schema;
pub mod sql;
pub mod watermark;

pub use archiver::{Archiver, ArchiverConfig, Clock};
pub use discovery::TableDiscovery;
pub use extract::IncrementalExtractor;
pub use loader::BatchLoader;
pub use report::{
    ChunkFailure, LoadReport, Replication, ResolvedWatermark, RunReport, SkippedEntry,
    SpecReport, Stage, StageFault, TableReport, WatermarkSource,
};
pub use schema::{
    create_table_from_schema, split_definitions, strip_constraints, SchemaIntrospector,
    SchemaReplicator,
};
pub use watermark::WatermarkResolver;
