//! Reading source files as all-text record batches.
//!
//! Every field is kept as text; typing happens downstream. Empty fields are
//! stored as nulls.

use std::collections::HashSet;
use std::sync::Arc;

use deltalake::arrow::array::{ArrayRef, RecordBatch, StringBuilder};
use deltalake::arrow::datatypes::{DataType, Field, Schema};
use snafu::prelude::*;
use tracing::debug;

use snowdrift_core::emit;
use snowdrift_core::metrics::events::SourceRead;
use snowdrift_core::storage::StorageProviderRef;

use crate::error::{
    BatchSnafu, BlankColumnSnafu, CsvSnafu, DuplicateColumnSnafu, FetchSnafu, MissingHeaderSnafu,
    ReadError, ReservedColumnSnafu,
};
use crate::provenance::{LOADED_AT_COLUMN, SOURCE_FILE_COLUMN};

use super::SourceFile;

/// Reads source files from a storage root.
#[derive(Debug, Clone)]
pub struct SourceReader {
    storage: StorageProviderRef,
    delimiter: u8,
    /// Source label for metrics.
    label: String,
}

impl SourceReader {
    pub fn new(storage: StorageProviderRef, delimiter: u8, label: impl Into<String>) -> Self {
        Self {
            storage,
            delimiter,
            label: label.into(),
        }
    }

    /// Whether the file exists. Absence is not an error.
    pub async fn exists(&self, file: &SourceFile) -> Result<bool, ReadError> {
        self.storage.exists(file.name()).await.context(FetchSnafu)
    }

    /// Fetch and parse the whole file.
    pub async fn read(&self, file: &SourceFile) -> Result<RecordBatch, ReadError> {
        let bytes = self.storage.get(file.name()).await.context(FetchSnafu)?;
        let batch = parse_delimited(&bytes, self.delimiter)?;

        debug!(
            file = %file,
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            bytes = bytes.len(),
            "Read source file"
        );
        emit!(SourceRead {
            rows: batch.num_rows() as u64,
            bytes: bytes.len() as u64,
            source: self.label.clone(),
        });

        Ok(batch)
    }
}

/// Parse delimited text with a header row into a batch of nullable text
/// columns.
///
/// Fails on a missing or invalid header, rows whose width differs from the
/// header, and non-UTF-8 content.
pub fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<RecordBatch, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers().context(CsvSnafu)?.clone();
    let columns = validate_header(&headers)?;

    let mut builders: Vec<StringBuilder> = columns.iter().map(|_| StringBuilder::new()).collect();
    for record in reader.records() {
        let record = record.context(CsvSnafu)?;
        for (builder, value) in builders.iter_mut().zip(record.iter()) {
            if value.is_empty() {
                builder.append_null();
            } else {
                builder.append_value(value);
            }
        }
    }

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = builders
        .iter_mut()
        .map(|b| Arc::new(b.finish()) as ArrayRef)
        .collect();

    RecordBatch::try_new(schema, arrays).context(BatchSnafu)
}

fn validate_header(headers: &csv::StringRecord) -> Result<Vec<String>, ReadError> {
    ensure!(
        !headers.is_empty() && headers.iter().any(|h| !h.trim().is_empty()),
        MissingHeaderSnafu
    );

    let mut seen = HashSet::with_capacity(headers.len());
    let mut columns = Vec::with_capacity(headers.len());
    for (position, raw) in headers.iter().enumerate() {
        let name = raw.trim_start_matches('\u{feff}').trim();
        ensure!(!name.is_empty(), BlankColumnSnafu { position: position + 1 });
        ensure!(
            !name.eq_ignore_ascii_case(SOURCE_FILE_COLUMN)
                && !name.eq_ignore_ascii_case(LOADED_AT_COLUMN),
            ReservedColumnSnafu { name }
        );
        ensure!(
            seen.insert(name.to_ascii_lowercase()),
            DuplicateColumnSnafu { name }
        );
        columns.push(name.to_string());
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{Array, StringArray};

    fn column<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn test_all_fields_are_text() {
        let csv = b"sale_date,price,commission\n2024-03-01,25000.50,0.05\n2024-03-02,019000,0.10\n";
        let batch = parse_delimited(csv, b',').unwrap();

        assert_eq!(batch.num_rows(), 2);
        for field in batch.schema().fields() {
            assert_eq!(field.data_type(), &DataType::Utf8);
            assert!(field.is_nullable());
        }
        // Leading zeros survive because nothing is coerced.
        assert_eq!(column(&batch, "price").value(1), "019000");
        assert_eq!(column(&batch, "sale_date").value(0), "2024-03-01");
    }

    #[test]
    fn test_empty_fields_are_null() {
        let batch = parse_delimited(b"a,b\n1,\n,2\n", b',').unwrap();
        assert!(column(&batch, "b").is_null(0));
        assert!(column(&batch, "a").is_null(1));
        assert_eq!(column(&batch, "b").value(1), "2");
    }

    #[test]
    fn test_quoted_fields_with_delimiters() {
        let batch = parse_delimited(b"model,notes\n\"Civic\",\"red, low miles\"\n", b',').unwrap();
        assert_eq!(column(&batch, "notes").value(0), "red, low miles");
    }

    #[test]
    fn test_custom_delimiter() {
        let batch = parse_delimited(b"a;b\n1;2\n", b';').unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(column(&batch, "b").value(0), "2");
    }

    #[test]
    fn test_header_only_file_has_zero_rows() {
        let batch = parse_delimited(b"a,b\n", b',').unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn test_byte_order_mark_is_stripped() {
        let batch = parse_delimited("\u{feff}a,b\n1,2\n".as_bytes(), b',').unwrap();
        assert_eq!(batch.schema().field(0).name(), "a");
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let err = parse_delimited(b"", b',').unwrap_err();
        assert!(matches!(err, ReadError::MissingHeader));
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let err = parse_delimited(b"a,b\n1,2\n3\n", b',').unwrap_err();
        assert!(matches!(err, ReadError::Csv { .. }));
    }

    #[test]
    fn test_non_utf8_is_rejected() {
        let err = parse_delimited(b"a,b\n\xff\xfe,2\n", b',').unwrap_err();
        assert!(matches!(err, ReadError::Csv { .. }));
    }

    #[test]
    fn test_reserved_column_is_rejected() {
        let err = parse_delimited(b"a,_source_file\n1,2\n", b',').unwrap_err();
        assert!(matches!(err, ReadError::ReservedColumn { .. }));
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let err = parse_delimited(b"price,PRICE\n1,2\n", b',').unwrap_err();
        assert!(matches!(err, ReadError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_blank_column_is_rejected() {
        let err = parse_delimited(b"a,,c\n1,2,3\n", b',').unwrap_err();
        assert!(matches!(err, ReadError::BlankColumn { position: 2 }));
    }
}
