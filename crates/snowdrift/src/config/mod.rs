//! Loader configuration.
//!
//! Every field has a default, so the loader runs without a config file.
//! A YAML file may override any subset; values are interpolated through the
//! same provider chain that supplies warehouse coordinates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use snowdrift_core::config::{ConfigProvider, MetricsConfig, load_yaml_file};
use snowdrift_core::error::ConfigError;

/// Default rows per uploaded chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Main configuration structure for a loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where monthly source files land and how they are named.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Directory or object-store URL holding the monthly files.
    #[serde(default = "default_root")]
    pub root: String,

    /// File name prefix, as in `<prefix>_<year>_<month>.<extension>`.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// File extension without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            prefix: default_prefix(),
            extension: default_extension(),
            delimiter: default_delimiter(),
            storage_options: HashMap::new(),
        }
    }
}

fn default_root() -> String {
    "/opt/airflow/data_lake/car_sales_data".to_string()
}

fn default_prefix() -> String {
    "car_sales_data".to_string()
}

fn default_extension() -> String {
    "csv".to_string()
}

fn default_delimiter() -> char {
    ','
}

/// Target table and write tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Schema inside the warehouse database.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Rows per uploaded chunk (default: 100000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum chunk uploads in flight (default: 4).
    #[serde(default = "default_upload_parallelism")]
    pub upload_parallelism: usize,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// What to do when the same source file was already committed.
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,

    /// Extra storage options for the warehouse (region, endpoint, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            table: default_table(),
            chunk_size: default_chunk_size(),
            upload_parallelism: default_upload_parallelism(),
            compression: ParquetCompression::default(),
            on_duplicate: DuplicatePolicy::default(),
            storage_options: HashMap::new(),
        }
    }
}

fn default_schema() -> String {
    "RAW".to_string()
}

fn default_table() -> String {
    "CAR_SALES".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_upload_parallelism() -> usize {
    4
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

/// Behavior when a source file has already been committed to the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Skip the load and report the earlier commit.
    #[default]
    SkipCommitted,
    /// Append again; every invocation adds rows.
    Append,
}

impl LoaderConfig {
    /// Load configuration from a YAML file, interpolating through `provider`.
    pub fn from_file(path: &Path, provider: &dyn ConfigProvider) -> Result<Self, ConfigError> {
        let config: Self = load_yaml_file(path, provider)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.source.root.trim().is_empty() {
            return Err(invalid("source.root", "must not be empty"));
        }
        if self.source.prefix.is_empty() || self.source.prefix.contains('/') {
            return Err(invalid(
                "source.prefix",
                "must be a non-empty file name prefix without '/'",
            ));
        }
        if self.source.extension.is_empty() || self.source.extension.contains(['/', '.']) {
            return Err(invalid(
                "source.extension",
                "must be a non-empty extension without '.' or '/'",
            ));
        }
        if !self.source.delimiter.is_ascii() || self.source.delimiter == '"' {
            return Err(invalid(
                "source.delimiter",
                "must be a single ASCII character other than '\"'",
            ));
        }
        if !is_identifier(&self.sink.schema) {
            return Err(invalid(
                "sink.schema",
                "must contain only letters, digits and underscores",
            ));
        }
        if !is_identifier(&self.sink.table) {
            return Err(invalid(
                "sink.table",
                "must contain only letters, digits and underscores",
            ));
        }
        if self.sink.chunk_size == 0 {
            return Err(invalid("sink.chunk_size", "must be greater than zero"));
        }
        if self.sink.upload_parallelism == 0 {
            return Err(invalid("sink.upload_parallelism", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Letters, digits and underscores, not starting with a digit.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
