//! Error types for the snowdrift loader.
//!
//! Each stage of a load has its own enum; [`LoadError`] wraps them with the
//! context a one-line diagnostic needs.

use snafu::prelude::*;

use snowdrift_core::error::{ConfigError, MetricsError, PeriodError, StorageError};
use snowdrift_core::metrics::events::FailureStage;

// ============ Read Errors ============

/// Errors that can occur while reading a source file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReadError {
    /// The source could not be fetched from storage.
    #[snafu(display("Failed to fetch source: {source}"))]
    Fetch { source: StorageError },

    /// The file is not valid delimited text.
    #[snafu(display("Malformed CSV: {source}"))]
    Csv { source: csv::Error },

    /// The file has no header row.
    #[snafu(display("File has no header row"))]
    MissingHeader,

    /// A header column has no name.
    #[snafu(display("Header column {position} has no name"))]
    BlankColumn { position: usize },

    /// A header names the same column twice.
    #[snafu(display("Duplicate column '{name}' in header"))]
    DuplicateColumn { name: String },

    /// A header column clashes with a provenance column.
    #[snafu(display("Column '{name}' is reserved for load provenance"))]
    ReservedColumn { name: String },

    /// Failed to assemble the in-memory batch.
    #[snafu(display("Failed to build record batch: {source}"))]
    Batch {
        source: deltalake::arrow::error::ArrowError,
    },
}

impl ReadError {
    /// Whether re-running could succeed without someone fixing the file.
    ///
    /// A file that is still being written can look truncated or malformed,
    /// so only header naming problems are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReadError::Fetch { .. } | ReadError::Csv { .. } | ReadError::MissingHeader
        )
    }
}

// ============ Connection Errors ============

/// Errors that can occur while connecting to the warehouse.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectionError {
    /// Required coordinates are absent from every configuration source.
    #[snafu(display("Missing warehouse coordinates: {}", keys.join(", ")))]
    MissingCoordinates { keys: Vec<String> },

    /// The account URL is not a usable storage location.
    #[snafu(display("Invalid warehouse account '{account}': {source}"))]
    InvalidAccount {
        account: String,
        source: StorageError,
    },

    /// The warehouse rejected the credentials.
    #[snafu(display("Warehouse rejected credentials for '{user}': {message}"))]
    Unauthorized { user: String, message: String },

    /// The table location could not be prepared.
    #[snafu(display("Failed to prepare table location {location}: {source}"))]
    PrepareLocation {
        location: String,
        source: std::io::Error,
    },

    /// The table could not be opened.
    #[snafu(display("Failed to open table {table}: {source}"))]
    OpenTable {
        table: String,
        source: deltalake::DeltaTableError,
    },
}

impl ConnectionError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConnectionError::MissingCoordinates { .. } | ConnectionError::InvalidAccount { .. }
        )
    }
}

// ============ Write Errors ============

/// Errors that can occur during the bulk write.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteError {
    /// Nothing to write.
    #[snafu(display("Refusing to write an empty batch"))]
    EmptyBatch,

    /// Incoming columns do not match the existing table.
    #[snafu(display(
        "Columns [{}] do not match table columns [{}]",
        incoming.join(", "),
        existing.join(", ")
    ))]
    SchemaMismatch {
        incoming: Vec<String>,
        existing: Vec<String>,
    },

    /// Failed to convert the batch schema into a table schema.
    #[snafu(display("Failed to convert schema: {source}"))]
    SchemaConversion {
        source: deltalake::arrow::error::ArrowError,
    },

    /// Failed to build the table schema.
    #[snafu(display("Failed to build table schema: {message}"))]
    StructType { message: String },

    /// Failed to encode a chunk as Parquet.
    #[snafu(display("Failed to encode chunk {index}: {source}"))]
    Encode {
        index: usize,
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to upload a chunk file.
    #[snafu(display("Failed to upload {path}: {source}"))]
    Upload {
        path: String,
        source: object_store::Error,
    },

    /// Failed to create the table.
    #[snafu(display("Failed to create table: {source}"))]
    CreateTable { source: deltalake::DeltaTableError },

    /// Failed to read the table log.
    #[snafu(display("Failed to read table log: {source}"))]
    LogScan { source: deltalake::DeltaTableError },

    /// The commit registering the chunks failed.
    #[snafu(display("Commit failed: {source}"))]
    Commit { source: deltalake::DeltaTableError },

    /// The warehouse persisted a different number of rows than were sent.
    #[snafu(display("Persisted {persisted} rows but {expected} were sent"))]
    RowCountMismatch { expected: usize, persisted: usize },

    /// The warehouse refused the write.
    #[snafu(display("Write rejected: {message}"))]
    Rejected { message: String },
}

impl WriteError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WriteError::EmptyBatch
                | WriteError::SchemaMismatch { .. }
                | WriteError::SchemaConversion { .. }
                | WriteError::StructType { .. }
        )
    }
}

// ============ Load Errors ============

/// A failed load, tagged with the stage that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// Reading the source file failed. No connection was opened.
    #[snafu(display("read failed for {file}: {source}"))]
    Read { file: String, source: ReadError },

    /// Connecting to the warehouse failed.
    #[snafu(display("connect failed: {source}"))]
    Connection { source: ConnectionError },

    /// Writing to the warehouse failed. Nothing was committed.
    #[snafu(display("write to {table} failed: {source}"))]
    Write { table: String, source: WriteError },
}

impl LoadError {
    /// The stage at which the load failed.
    pub fn stage(&self) -> FailureStage {
        match self {
            LoadError::Read { .. } => FailureStage::Read,
            LoadError::Connection { .. } => FailureStage::Connect,
            LoadError::Write { .. } => FailureStage::Write,
        }
    }

    /// Whether a fresh invocation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Read { source, .. } => source.is_retryable(),
            LoadError::Connection { source } => source.is_retryable(),
            LoadError::Write { source, .. } => source.is_retryable(),
        }
    }
}

// ============ Setup Errors ============

/// Errors raised before a load starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SetupError {
    /// The execution date could not be resolved.
    #[snafu(display("{source}"))]
    Period { source: PeriodError },

    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// The source root is not a usable storage location.
    #[snafu(display("Invalid source root '{root}': {source}"))]
    SourceStorage { root: String, source: StorageError },
}

impl From<PeriodError> for SetupError {
    fn from(source: PeriodError) -> Self {
        SetupError::Period { source }
    }
}

impl From<ConfigError> for SetupError {
    fn from(source: ConfigError) -> Self {
        SetupError::Config { source }
    }
}

impl From<MetricsError> for SetupError {
    fn from(source: MetricsError) -> Self {
        SetupError::Metrics { source }
    }
}
