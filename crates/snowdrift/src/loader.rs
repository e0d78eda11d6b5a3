//! Single-period load orchestration.
//!
//! A run resolves the source file for its period and reads it into memory.
//! It then stamps provenance and writes everything through one warehouse
//! connection. The connection is held in a [`ConnectionGuard`], so it is
//! released exactly once on every path out of [`BatchLoader::run`].

use std::fmt;
use std::time::{Duration, Instant};

use snafu::prelude::*;
use tracing::{error, info, warn};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::{RowsLoaded, RunCompleted, RunStatus, StageFailed};
use snowdrift_core::period::RunPeriod;

use crate::config::{DuplicatePolicy, SinkConfig};
use crate::error::{
    BatchSnafu, ConnectionSnafu, LoadError, ReadSnafu, RowCountMismatchSnafu, WriteError,
    WriteSnafu,
};
use crate::provenance::{EnrichedRecords, Provenance};
use crate::source::{SourceFile, SourceLocator, SourceReader};
use crate::warehouse::{ConnectionGuard, Warehouse, WarehouseConnection, WriteRequest};

/// Why a run finished without writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No file exists for the period.
    NoSourceFile,
    /// The file was committed by an earlier run.
    AlreadyLoaded { version: i64 },
    /// The file holds a header and no rows.
    EmptySource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSourceFile => write!(f, "no source file"),
            SkipReason::AlreadyLoaded { version } => {
                write!(f, "already loaded at version {version}")
            }
            SkipReason::EmptySource => write!(f, "source file has no rows"),
        }
    }
}

/// Terminal result of one run.
#[derive(Debug)]
pub enum LoadOutcome {
    Skipped(SkipReason),
    Loaded { rows: usize, version: i64 },
    Failed(LoadError),
}

impl LoadOutcome {
    /// Loaded and Skipped both count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, LoadOutcome::Failed(_))
    }

    pub fn status(&self) -> RunStatus {
        match self {
            LoadOutcome::Skipped(_) => RunStatus::Skipped,
            LoadOutcome::Loaded { .. } => RunStatus::Loaded,
            LoadOutcome::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            LoadOutcome::Loaded { rows, version } => {
                write!(f, "loaded {rows} rows at version {version}")
            }
            LoadOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Result of the read phase.
#[derive(Debug)]
pub enum Prepared {
    Skipped(SkipReason),
    Ready {
        file: SourceFile,
        records: EnrichedRecords,
    },
}

/// Loads one monthly file into one warehouse table.
pub struct BatchLoader<W: Warehouse> {
    locator: SourceLocator,
    reader: SourceReader,
    warehouse: W,
    sink: SinkConfig,
}

impl<W: Warehouse> BatchLoader<W> {
    pub fn new(locator: SourceLocator, reader: SourceReader, warehouse: W, sink: SinkConfig) -> Self {
        Self {
            locator,
            reader,
            warehouse,
            sink,
        }
    }

    /// Locate, read and enrich the file for `period` without connecting.
    pub async fn prepare(&self, period: RunPeriod) -> Result<Prepared, LoadError> {
        let file = self.locator.resolve_path(&period);

        let exists = self.reader.exists(&file).await.context(ReadSnafu {
            file: file.name(),
        })?;
        if !exists {
            info!(period = %period, file = %file, "Source file absent, nothing to load");
            return Ok(Prepared::Skipped(SkipReason::NoSourceFile));
        }

        let batch = self.reader.read(&file).await.context(ReadSnafu {
            file: file.name(),
        })?;
        if batch.num_rows() == 0 {
            warn!(period = %period, file = %file, "Source file has a header but no rows");
            return Ok(Prepared::Skipped(SkipReason::EmptySource));
        }

        let provenance = Provenance::capture(&file);
        let records = provenance
            .enrich(&batch)
            .context(BatchSnafu)
            .context(ReadSnafu { file: file.name() })?;

        info!(
            period = %period,
            file = %file,
            rows = records.rows(),
            columns = batch.num_columns(),
            loaded_at = %provenance.loaded_at_text(),
            "Source file read"
        );

        Ok(Prepared::Ready { file, records })
    }

    /// Run the load for `period` and report how it ended.
    pub async fn run(&self, period: RunPeriod) -> LoadOutcome {
        let start = Instant::now();

        let result = match self.prepare(period).await {
            Ok(Prepared::Ready { file, records }) => self.write(&file, records).await,
            Ok(Prepared::Skipped(reason)) => Ok(LoadOutcome::Skipped(reason)),
            Err(err) => Err(err),
        };
        let outcome = result.unwrap_or_else(LoadOutcome::Failed);

        self.record(period, &outcome, start.elapsed());
        outcome
    }

    async fn write(
        &self,
        file: &SourceFile,
        records: EnrichedRecords,
    ) -> Result<LoadOutcome, LoadError> {
        let connection = self
            .warehouse
            .connect(&self.sink.schema, &self.sink.table)
            .await
            .context(ConnectionSnafu)?;
        let mut connection = ConnectionGuard::new(connection);
        let table = connection.table_ref().to_string();

        if self.sink.on_duplicate == DuplicatePolicy::SkipCommitted {
            let committed = connection
                .committed_version(file.source_id())
                .await
                .context(WriteSnafu { table: &table })?;
            if let Some(version) = committed {
                info!(
                    file = %file,
                    table = %table,
                    version,
                    "Source file already committed, skipping"
                );
                return Ok(LoadOutcome::Skipped(SkipReason::AlreadyLoaded { version }));
            }
        }

        let expected = records.rows();
        let request = WriteRequest {
            source_id: file.source_id().to_string(),
            chunk_size: self.sink.chunk_size,
            upload_parallelism: self.sink.upload_parallelism,
            compression: self.sink.compression,
        };

        let receipt = connection
            .bulk_write(records.into_batch(), &request)
            .await
            .context(WriteSnafu { table: &table })?;

        ensure_rows_persisted(expected, receipt.rows_written).context(WriteSnafu { table: &table })?;

        connection.release();

        Ok(LoadOutcome::Loaded {
            rows: receipt.rows_written,
            version: receipt.version,
        })
    }

    fn record(&self, period: RunPeriod, outcome: &LoadOutcome, duration: Duration) {
        let source = self.locator.prefix().to_string();

        match outcome {
            LoadOutcome::Loaded { rows, version } => {
                emit!(RowsLoaded {
                    count: *rows as u64,
                    source: source.clone(),
                });
                info!(
                    period = %period,
                    rows,
                    version,
                    duration_ms = duration.as_millis() as u64,
                    "Load complete"
                );
            }
            LoadOutcome::Skipped(reason) => {
                info!(period = %period, reason = %reason, "Load skipped");
            }
            LoadOutcome::Failed(err) => {
                emit!(StageFailed {
                    stage: err.stage(),
                    source: source.clone(),
                });
                error!(
                    period = %period,
                    stage = err.stage().as_str(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Load failed"
                );
            }
        }

        emit!(RunCompleted {
            status: outcome.status(),
            duration,
            source,
        });
    }
}

fn ensure_rows_persisted(expected: usize, persisted: usize) -> Result<(), WriteError> {
    ensure!(
        expected == persisted,
        RowCountMismatchSnafu {
            expected,
            persisted
        }
    );
    Ok(())
}
