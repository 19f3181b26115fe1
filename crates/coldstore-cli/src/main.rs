//! coldstore: move aged rows from a primary database into an archive database.
//!
//! Each run reads the jobs file, archives every matching table once and
//! prints a report. The exit status is zero even when tables fail; failures
//! are logged and listed in the report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use coldstore_archive::{Archiver, ArchiverConfig, RunReport};
use coldstore_core::defaults::{ARCHIVE_STORE, PRIMARY_STORE};
use coldstore_core::{ArchiveSettings, JobsFile, RelationalStore};
use coldstore_db::{connect_store, PoolConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "coldstore")]
#[command(author, version, about = "Archive aged rows into a cold-storage database")]
struct Args {
    /// Jobs file listing the tables to archive (YAML, or JSON by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Primary database URL (overrides PRIMARY_DATABASE_URL)
    #[arg(long)]
    primary_url: Option<String>,

    /// Archive database URL (overrides ARCHIVE_DATABASE_URL)
    #[arg(long)]
    archive_url: Option<String>,

    /// Rows per insert chunk
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,

    /// 0 = warnings only, 1 = progress, 2 = executed SQL, 3 = everything
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    /// Report what would be archived without creating or inserting anything
    #[arg(long)]
    dry_run: bool,

    /// Report format printed to stdout
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

impl Args {
    /// Apply command-line overrides on top of environment settings.
    fn apply(&self, settings: &mut ArchiveSettings) {
        if let Some(ref path) = self.config {
            settings.config_path = path.display().to_string();
        }
        if let Some(ref url) = self.primary_url {
            settings.primary_url = Some(url.clone());
        }
        if let Some(ref url) = self.archive_url {
            settings.archive_url = Some(url.clone());
        }
    }

    /// Chunk size: command line, then jobs file, then environment.
    fn batch_size(&self, jobs: &JobsFile, settings: &ArchiveSettings) -> usize {
        self.batch_size
            .and_then(|n| usize::try_from(n).ok())
            .or(jobs.batch_size)
            .unwrap_or(settings.batch_size)
            .max(1)
    }
}

/// Default filter for a verbosity level when RUST_LOG is unset.
fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,sqlx=warn",
        2 => "debug,sqlx=warn",
        _ => "trace,sqlx=debug",
    }
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: from --verbosity)
fn init_logging(verbosity: u8) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| verbosity_filter(verbosity).into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("coldstore.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output; stdout is reserved for the report
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        subsystem = "cli",
        verbosity,
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    file_guard
}

/// Run the archiver and render its report.
async fn archive(
    primary: Arc<dyn RelationalStore>,
    archive: Arc<dyn RelationalStore>,
    config: ArchiverConfig,
    jobs: &JobsFile,
    format: ReportFormat,
) -> anyhow::Result<(RunReport, String)> {
    let archiver = Archiver::new(primary, archive, config)?;
    let report = archiver.run(&jobs.tables).await;
    let rendered = match format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Json => report.to_json().context("serializing run report")?,
    };
    Ok((report, rendered))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = ArchiveSettings::from_env();
    args.apply(&mut settings);

    let jobs = JobsFile::load(&settings.config_path)
        .with_context(|| format!("loading jobs file {}", settings.config_path))?;
    let config = ArchiverConfig::default()
        .with_batch_size(args.batch_size(&jobs, &settings))
        .with_dry_run(args.dry_run)
        .with_verbosity(args.verbosity);

    info!(
        subsystem = "cli",
        config_path = %settings.config_path,
        entries = jobs.tables.len(),
        batch_size = config.batch_size,
        dry_run = config.dry_run,
        "Configuration loaded"
    );

    let pool_config = PoolConfig::new().max_connections(settings.max_connections);
    let primary = connect_store(
        PRIMARY_STORE,
        settings.require_primary_url()?,
        &pool_config,
        settings.primary_schema.clone(),
    )
    .await
    .context("connecting to the primary store")?;
    let archive_store = connect_store(
        ARCHIVE_STORE,
        settings.require_archive_url()?,
        &pool_config,
        settings.archive_schema.clone(),
    )
    .await
    .context("connecting to the archive store")?;

    let (_, rendered) = archive(primary, archive_store, config, &jobs, args.report).await?;
    println!("{}", rendered.trim_end());
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _file_guard = init_logging(args.verbosity);

    // Archival is best effort: problems are logged, never turned into a
    // failing exit status.
    if let Err(e) = run(args).await {
        error!(subsystem = "cli", error = %format!("{:#}", e), "Archive run aborted");
    }
}
