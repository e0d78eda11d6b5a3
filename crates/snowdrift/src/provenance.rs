//! Load provenance columns.
//!
//! Every row handed to the warehouse carries the name of the file it came
//! from and the wall-clock time of the load.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use deltalake::arrow::array::{ArrayRef, RecordBatch, StringArray};
use deltalake::arrow::datatypes::{DataType, Field, Schema};
use deltalake::arrow::error::ArrowError;

use crate::source::SourceFile;

/// Column holding the source file name.
pub const SOURCE_FILE_COLUMN: &str = "_SOURCE_FILE";

/// Column holding the load timestamp.
pub const LOADED_AT_COLUMN: &str = "_LOADED_AT";

/// Format of `_LOADED_AT` values (UTC, second precision).
pub const LOADED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Provenance captured once per load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    source_file: String,
    loaded_at: DateTime<Utc>,
}

impl Provenance {
    /// Capture provenance for `file` at the current time.
    pub fn capture(file: &SourceFile) -> Self {
        Self::at(file, Utc::now())
    }

    /// Provenance with an explicit load time, truncated to whole seconds.
    pub fn at(file: &SourceFile, loaded_at: DateTime<Utc>) -> Self {
        Self {
            source_file: file.name().to_string(),
            loaded_at: loaded_at.trunc_subsecs(0),
        }
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn loaded_at_text(&self) -> String {
        self.loaded_at.format(LOADED_AT_FORMAT).to_string()
    }

    /// Append the provenance columns to `batch`.
    pub fn enrich(&self, batch: &RecordBatch) -> Result<EnrichedRecords, ArrowError> {
        let rows = batch.num_rows();
        let loaded_at = self.loaded_at_text();

        let mut fields: Vec<Arc<Field>> = batch.schema().fields().iter().cloned().collect();
        fields.push(Arc::new(Field::new(SOURCE_FILE_COLUMN, DataType::Utf8, true)));
        fields.push(Arc::new(Field::new(LOADED_AT_COLUMN, DataType::Utf8, true)));

        let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
        columns.push(Arc::new(StringArray::from_iter_values(std::iter::repeat_n(
            self.source_file.as_str(),
            rows,
        ))));
        columns.push(Arc::new(StringArray::from_iter_values(std::iter::repeat_n(
            loaded_at.as_str(),
            rows,
        ))));

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(EnrichedRecords {
            batch,
            provenance: self.clone(),
        })
    }
}

/// Source rows plus provenance columns, ready to write.
#[derive(Debug, Clone)]
pub struct EnrichedRecords {
    batch: RecordBatch,
    provenance: Provenance,
}

impl EnrichedRecords {
    pub fn rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }
}
