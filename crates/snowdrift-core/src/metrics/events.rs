//! Internal events for snowdrift metrics emission.
//!
//! Each event struct represents a measurable occurrence in a load run.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.
//!
//! ## Source Labels
//!
//! Run-level metrics carry a `source` label holding the file prefix, so a
//! textfile collector can tell apart loaders that share a node.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Run outcome events
// ============================================================================

/// Final status of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Loaded,
    Skipped,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Loaded => "loaded",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        }
    }
}

/// Event emitted once per run with its final status.
pub struct RunCompleted {
    pub status: RunStatus,
    pub duration: Duration,
    /// Source label (file prefix).
    pub source: String,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        trace!(
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            source = %self.source,
            "Run completed"
        );
        counter!(
            "snowdrift_runs_total",
            "status" => self.status.as_str(),
            "source" => self.source.clone()
        )
        .increment(1);
        histogram!("snowdrift_run_duration_seconds", "source" => self.source.clone())
            .record(self.duration.as_secs_f64());
        gauge!("snowdrift_last_run_status", "source" => self.source).set(match self.status {
            RunStatus::Loaded => 1.0,
            RunStatus::Skipped => 0.0,
            RunStatus::Failed => -1.0,
        });
    }
}

/// Stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Connect,
    Write,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Read => "read",
            FailureStage::Connect => "connect",
            FailureStage::Write => "write",
        }
    }
}

/// Event emitted when a run fails.
pub struct StageFailed {
    pub stage: FailureStage,
    /// Source label (file prefix).
    pub source: String,
}

impl InternalEvent for StageFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), source = %self.source, "Stage failed");
        counter!("snowdrift_failures_total", "stage" => self.stage.as_str(), "source" => self.source)
            .increment(1);
    }
}

// ============================================================================
// Pipeline events
// ============================================================================

/// Event emitted when a source file has been read into memory.
pub struct SourceRead {
    pub rows: u64,
    pub bytes: u64,
    /// Source label (file prefix).
    pub source: String,
}

impl InternalEvent for SourceRead {
    fn emit(self) {
        trace!(rows = self.rows, bytes = self.bytes, source = %self.source, "Source read");
        counter!("snowdrift_source_bytes_read_total", "source" => self.source.clone())
            .increment(self.bytes);
        counter!("snowdrift_source_rows_read_total", "source" => self.source).increment(self.rows);
    }
}

/// Event emitted when a Parquet chunk lands in warehouse storage.
pub struct ChunkUploaded {
    pub rows: u64,
    pub bytes: u64,
    /// Target table label.
    pub table: String,
}

impl InternalEvent for ChunkUploaded {
    fn emit(self) {
        trace!(rows = self.rows, bytes = self.bytes, table = %self.table, "Chunk uploaded");
        counter!("snowdrift_chunks_uploaded_total", "table" => self.table.clone()).increment(1);
        counter!("snowdrift_bytes_written_total", "table" => self.table).increment(self.bytes);
    }
}

/// Event emitted when a table commit succeeds.
pub struct DeltaCommitCompleted {
    pub version: i64,
    pub duration: Duration,
    /// Target table label.
    pub table: String,
}

impl InternalEvent for DeltaCommitCompleted {
    fn emit(self) {
        trace!(
            version = self.version,
            duration_ms = self.duration.as_millis(),
            table = %self.table,
            "Delta commit completed"
        );
        counter!("snowdrift_delta_commits_total", "table" => self.table.clone()).increment(1);
        histogram!("snowdrift_delta_commit_duration_seconds", "table" => self.table.clone())
            .record(self.duration.as_secs_f64());
        gauge!("snowdrift_delta_table_version", "table" => self.table).set(self.version as f64);
    }
}

/// Event emitted when rows are committed to the warehouse.
pub struct RowsLoaded {
    pub count: u64,
    /// Source label (file prefix).
    pub source: String,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(count = self.count, source = %self.source, "Rows loaded");
        counter!("snowdrift_rows_loaded_total", "source" => self.source).increment(self.count);
    }
}

// ============================================================================
// Storage events
// ============================================================================

/// Storage operation type.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Head,
    Get,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Head => "head",
            StorageOperation::Get => "get",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "snowdrift_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "snowdrift_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
