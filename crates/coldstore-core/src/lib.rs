//! # coldstore-core
//!
//! Core types, traits, and configuration for coldstore, the recurring
//! cold-storage archiver that moves aged rows from a primary relational store
//! into an archive store.
//!
//! This crate provides the foundational data structures and the
//! [`RelationalStore`] capability trait that the database and engine crates
//! depend on.

pub mod config;
pub mod defaults;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod value;

// Re-export commonly used types at crate root
pub use config::{ArchiveSettings, JobsFile};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use models::*;
pub use traits::{RelationalStore, Statement};
pub use value::{RowBatch, RowRecord, SqlType, SqlValue};
