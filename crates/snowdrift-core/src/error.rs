//! Common error types shared by the snowdrift crates.
//!
//! This module defines error types for period resolution, storage,
//! configuration and metrics export.

use snafu::prelude::*;

// ============ Period Errors ============

/// Errors that can occur while turning a logical run date into a period.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PeriodError {
    /// The execution date is neither `YYYY-MM-DD` nor an ISO-8601 date-time.
    #[snafu(display(
        "Malformed execution date '{input}': expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ss[±hh:mm]"
    ))]
    MalformedDate { input: String },

    /// Month outside of 1..=12.
    #[snafu(display("Month {month} is outside of 1..=12"))]
    InvalidMonth { month: u32 },

    /// Period range where the end precedes the start.
    #[snafu(display("Period range is inverted: {start} is after {end}"))]
    InvertedRange { start: String, end: String },
}

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Variable interpolation failed.
    #[snafu(display("Variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// A secrets file holds something other than a flat key/value mapping.
    #[snafu(display("Secrets file {} must be a flat mapping of keys to scalar values", path.display()))]
    SecretsShape { path: std::path::PathBuf },

    /// Required keys are missing from every configuration source.
    #[snafu(display("Missing required configuration: {}", keys.join(", ")))]
    MissingKeys { keys: Vec<String> },

    /// A configuration value failed validation.
    #[snafu(display("Invalid configuration for '{field}': {message}"))]
    Invalid { field: String, message: String },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics recorder already initialized.
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,

    /// Metrics recorder not initialized.
    #[snafu(display("Metrics recorder not initialized"))]
    NotInitialized,

    /// Failed to write the metrics textfile.
    #[snafu(display("Failed to write metrics textfile {}: {source}", path.display()))]
    WriteTextfile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}
