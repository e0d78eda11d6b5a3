//! Wiring shared by the binaries: arguments, configuration and loader setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser};
use snafu::prelude::*;
use tracing::{info, warn};

use snowdrift_core::config::{ChainProvider, ConfigProvider};
use snowdrift_core::error::ConfigError;
use snowdrift_core::metrics::{self, MetricsController};
use snowdrift_core::period::RunPeriod;
use snowdrift_core::storage::StorageProvider;

use crate::backfill::RetryPolicy;
use crate::config::LoaderConfig;
use crate::error::{SetupError, SourceStorageSnafu};
use crate::loader::BatchLoader;
use crate::source::{SourceLocator, SourceReader};
use crate::warehouse::DeltaWarehouse;

/// Options common to every binary.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to a YAML secrets file consulted after the environment.
    #[arg(long)]
    pub secrets: Option<PathBuf>,

    /// Write Prometheus metrics to this file on exit.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

/// Load one month of car sales data into the warehouse.
#[derive(Parser, Debug)]
#[command(name = "snowdrift")]
#[command(author, version, about, long_about = None)]
pub struct LoadArgs {
    /// Scheduler execution date, YYYY-MM-DD or an ISO-8601 date-time.
    pub execution_date: String,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Read and enrich the source file without connecting to the warehouse.
    #[arg(long)]
    pub dry_run: bool,
}

/// Load every month in a range, retrying transient failures.
#[derive(Parser, Debug)]
#[command(name = "snowdrift-backfill")]
#[command(author, version, about, long_about = None)]
pub struct BackfillArgs {
    /// First period, YYYY-MM.
    #[arg(long)]
    pub from: RunPeriod,

    /// Last period, YYYY-MM (default: the current month).
    #[arg(long)]
    pub to: Option<RunPeriod>,

    /// Extra attempts for a period that failed with a retryable error.
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Seconds to wait before retrying a period.
    #[arg(long, default_value_t = 15)]
    pub retry_delay_secs: u64,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl BackfillArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: std::time::Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Resolved configuration and the provider chain behind it.
pub struct AppContext {
    pub config: LoaderConfig,
    provider: Arc<ChainProvider>,
    metrics_file: Option<PathBuf>,
}

impl AppContext {
    /// Build the provider chain and load the config file, if any.
    pub fn from_args(args: &CommonArgs) -> Result<Self, SetupError> {
        let provider = ChainProvider::standard(args.secrets.as_deref())?;

        let config = match &args.config {
            Some(path) => {
                info!(path = %path.display(), "Loading config");
                LoaderConfig::from_file(path, &provider)?
            }
            None => LoaderConfig::default(),
        };

        let metrics_file = args
            .metrics_file
            .clone()
            .or_else(|| config.metrics.textfile.clone());

        Ok(Self {
            config,
            provider: Arc::new(provider),
            metrics_file,
        })
    }

    pub fn provider(&self) -> Arc<dyn ConfigProvider> {
        self.provider.clone()
    }

    /// Install the Prometheus recorder.
    pub fn init_metrics(&self) -> Result<(), SetupError> {
        metrics::init_global()?;
        Ok(())
    }

    /// Build a loader reading from the configured source root.
    pub async fn loader(&self) -> Result<BatchLoader<DeltaWarehouse>, SetupError> {
        let source = &self.config.source;

        let delimiter = u8::try_from(source.delimiter).map_err(|_| ConfigError::Invalid {
            field: "source.delimiter".to_string(),
            message: "must be a single ASCII character".to_string(),
        })?;

        let storage = StorageProvider::for_url_with_options(&source.root, source.storage_options.clone())
            .await
            .context(SourceStorageSnafu { root: &source.root })?;

        let reader = SourceReader::new(Arc::new(storage), delimiter, &source.prefix);
        let warehouse =
            DeltaWarehouse::new(self.provider(), self.config.sink.storage_options.clone());

        Ok(BatchLoader::new(
            SourceLocator::from_config(source),
            reader,
            warehouse,
            self.config.sink.clone(),
        ))
    }

    /// Write the metrics textfile when one is configured. Failures are logged.
    pub fn export_metrics(&self) {
        let Some(path) = &self.metrics_file else {
            return;
        };
        match MetricsController::get().and_then(|controller| controller.write_textfile(path)) {
            Ok(()) => info!(path = %path.display(), "Wrote metrics textfile"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write metrics textfile"),
        }
    }
}

/// Collapse a diagnostic onto one line.
pub fn one_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
