//! Error types for coldstore.

use thiserror::Error;

/// Result type alias using coldstore's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for coldstore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A column type the stores cannot carry between primary and archive
    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },

    /// A table lacks the integer column used as the resume cursor
    #[error("Table {table} has no `{column}` column; it cannot be archived incrementally")]
    MissingWatermarkColumn { table: String, column: String },

    /// The store cannot perform the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unsupported_type() {
        let err = Error::UnsupportedType {
            column: "shape".to_string(),
            type_name: "GEOMETRY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported column type GEOMETRY for column shape"
        );
    }

    #[test]
    fn test_error_display_missing_watermark_column() {
        let err = Error::MissingWatermarkColumn {
            table: "audit_log".to_string(),
            column: "id".to_string(),
        };
        assert!(err.to_string().contains("audit_log"));
        assert!(err.to_string().contains("`id`"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing PRIMARY_DATABASE_URL".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: missing PRIMARY_DATABASE_URL"
        );
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("negative retention".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative retention");
    }

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::Unsupported("SHOW CREATE TABLE".to_string());
        assert_eq!(err.to_string(), "Unsupported operation: SHOW CREATE TABLE");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_serde_yaml_error() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("tables: [").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(err.to_string().contains("Serialization error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "archive.yaml");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
