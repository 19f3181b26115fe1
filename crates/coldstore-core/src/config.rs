//! Configuration: the jobs file and environment settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::ArchiveTableEntry;

/// Contents of the jobs file (`archive.yaml` by default).
///
/// ```yaml
/// batch_size: 5000
/// tables:
///   - table: orders
///     days_old: 365
///     date_field: created_at
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsFile {
    #[serde(default)]
    pub tables: Vec<ArchiveTableEntry>,
    /// Optional batch-size override for every table.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl JobsFile {
    /// Load a jobs file. `.json` files are parsed as JSON, everything else as
    /// YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read jobs file {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Connection and tuning settings, usually from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub primary_url: Option<String>,
    pub archive_url: Option<String>,
    /// Catalog scope override for the primary store.
    pub primary_schema: Option<String>,
    /// Catalog scope override for the archive store.
    pub archive_schema: Option<String>,
    pub config_path: String,
    pub batch_size: usize,
    pub max_connections: u32,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            primary_url: None,
            archive_url: None,
            primary_schema: None,
            archive_schema: None,
            config_path: defaults::CONFIG_PATH.to_string(),
            batch_size: defaults::BATCH_SIZE,
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl ArchiveSettings {
    /// Create settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PRIMARY_DATABASE_URL` | - | Store rows are archived from |
    /// | `ARCHIVE_DATABASE_URL` | - | Store rows are archived into |
    /// | `PRIMARY_SCHEMA` | store default | Catalog scope on the primary |
    /// | `ARCHIVE_SCHEMA` | store default | Catalog scope on the archive |
    /// | `ARCHIVE_CONFIG` | `archive.yaml` | Jobs file |
    /// | `ARCHIVE_BATCH_SIZE` | `10000` | Rows per insert chunk |
    /// | `DB_MAX_CONNECTIONS` | `4` | Pool size per store |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let batch_size = non_empty("ARCHIVE_BATCH_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BATCH_SIZE)
            .max(1);

        let max_connections = non_empty("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::DB_MAX_CONNECTIONS)
            .max(1);

        Self {
            primary_url: non_empty("PRIMARY_DATABASE_URL"),
            archive_url: non_empty("ARCHIVE_DATABASE_URL"),
            primary_schema: non_empty("PRIMARY_SCHEMA"),
            archive_schema: non_empty("ARCHIVE_SCHEMA"),
            config_path: non_empty("ARCHIVE_CONFIG")
                .unwrap_or_else(|| defaults::CONFIG_PATH.to_string()),
            batch_size,
            max_connections,
        }
    }

    /// Primary URL, or a configuration error naming the missing variable.
    pub fn require_primary_url(&self) -> Result<&str> {
        self.primary_url
            .as_deref()
            .ok_or_else(|| Error::Config("PRIMARY_DATABASE_URL is not set".to_string()))
    }

    /// Archive URL, or a configuration error naming the missing variable.
    pub fn require_archive_url(&self) -> Result<&str> {
        self.archive_url
            .as_deref()
            .ok_or_else(|| Error::Config("ARCHIVE_DATABASE_URL is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_jobs_file_from_yaml() {
        let yaml = r#"
batch_size: 500
tables:
  - table: orders
    days_old: 365
    date_field: created_at
  - table: audit_
    days_old: 30
    date_field: logged_at
"#;
        let jobs = JobsFile::from_yaml_str(yaml).unwrap();
        assert_eq!(jobs.batch_size, Some(500));
        assert_eq!(jobs.tables.len(), 2);
        assert_eq!(
            jobs.tables[1],
            ArchiveTableEntry::new("audit_", 30, "logged_at")
        );
    }

    #[test]
    fn test_jobs_file_from_json() {
        let json = r#"{"tables": [{"table": "orders", "days_old": 7, "date_field": "created_at"}]}"#;
        let jobs = JobsFile::from_json_str(json).unwrap();
        assert_eq!(jobs.batch_size, None);
        assert!(jobs.tables[0].to_spec().is_ok());
    }

    #[test]
    fn test_incomplete_entries_still_deserialize() {
        let yaml = r#"
tables:
  - table: orders
    days_old: 365
    date_field: created_at
  - table: invoices
    date_field: issued_at
  - days_old: 10
    date_field: created_at
  - table: sessions
    days_old: 1
    date_field: ""
"#;
        let jobs = JobsFile::from_yaml_str(yaml).unwrap();
        assert_eq!(jobs.tables.len(), 4);
        let specs: Vec<_> = jobs.tables.iter().filter_map(|e| e.to_spec().ok()).collect();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].table_pattern, "orders");
    }

    #[test]
    fn test_jobs_file_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("archive.yaml");
        let mut f = std::fs::File::create(&yaml_path).unwrap();
        writeln!(f, "tables:\n  - table: orders\n    days_old: 1\n    date_field: created_at").unwrap();
        assert_eq!(JobsFile::load(&yaml_path).unwrap().tables.len(), 1);

        let json_path = dir.path().join("archive.json");
        std::fs::write(&json_path, r#"{"tables": []}"#).unwrap();
        assert!(JobsFile::load(&json_path).unwrap().tables.is_empty());
    }

    #[test]
    fn test_jobs_file_load_missing() {
        let err = JobsFile::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ArchiveSettings::from_lookup(lookup(&[]));
        assert_eq!(settings, ArchiveSettings::default());
        assert!(settings.require_primary_url().is_err());
        assert!(settings.require_archive_url().is_err());
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = ArchiveSettings::from_lookup(lookup(&[
            ("PRIMARY_DATABASE_URL", "mysql://app@db/app"),
            ("ARCHIVE_DATABASE_URL", "mysql://app@archive/app_archive"),
            ("ARCHIVE_SCHEMA", "app_archive"),
            ("ARCHIVE_BATCH_SIZE", "2500"),
            ("ARCHIVE_CONFIG", "/etc/coldstore/jobs.yaml"),
            ("DB_MAX_CONNECTIONS", "2"),
        ]));
        assert_eq!(settings.require_primary_url().unwrap(), "mysql://app@db/app");
        assert_eq!(settings.archive_schema.as_deref(), Some("app_archive"));
        assert_eq!(settings.primary_schema, None);
        assert_eq!(settings.batch_size, 2500);
        assert_eq!(settings.config_path, "/etc/coldstore/jobs.yaml");
        assert_eq!(settings.max_connections, 2);
    }

    #[test]
    fn test_settings_ignore_invalid_numbers() {
        let settings = ArchiveSettings::from_lookup(lookup(&[
            ("ARCHIVE_BATCH_SIZE", "lots"),
            ("DB_MAX_CONNECTIONS", "0"),
            ("PRIMARY_DATABASE_URL", "  "),
        ]));
        assert_eq!(settings.batch_size, defaults::BATCH_SIZE);
        assert_eq!(settings.max_connections, 1);
        assert_eq!(settings.primary_url, None);
    }
}
