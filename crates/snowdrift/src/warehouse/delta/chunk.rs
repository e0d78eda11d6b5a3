//! Chunked Parquet encoding.
//!
//! A batch is sliced into fixed-size chunks and each chunk becomes one
//! Parquet file. Row counts are read back from the encoded footer.

use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use deltalake::parquet::file::reader::{FileReader, SerializedFileReader};
use uuid::Uuid;

use crate::config::ParquetCompression;
use crate::error::WriteError;

/// One encoded chunk, ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Position of the chunk in the batch.
    pub index: usize,
    /// File name relative to the table root.
    pub path: String,
    pub bytes: Bytes,
    /// Rows recorded in the Parquet footer.
    pub rows: usize,
}

impl EncodedChunk {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Row ranges `(offset, len)` covering `total` rows in chunks of `chunk_size`.
pub fn chunk_ranges(total: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let chunk_size = chunk_size.max(1);
    (0..total)
        .step_by(chunk_size)
        .map(|offset| (offset, chunk_size.min(total - offset)))
        .collect()
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}

fn generate_filename(index: usize) -> String {
    format!("part-{index:05}-{}.parquet", Uuid::now_v7())
}

/// Encode one slice of `batch` as a Parquet file.
pub fn encode_chunk(
    batch: &RecordBatch,
    index: usize,
    offset: usize,
    len: usize,
    compression: ParquetCompression,
) -> Result<EncodedChunk, WriteError> {
    let encode_err = |source| WriteError::Encode { index, source };

    let slice = batch.slice(offset, len);
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(
        &mut buffer,
        slice.schema(),
        Some(writer_properties(compression)),
    )
    .map_err(encode_err)?;
    writer.write(&slice).map_err(encode_err)?;
    writer.close().map_err(encode_err)?;

    let bytes = Bytes::from(buffer);
    let rows = footer_row_count(&bytes).map_err(encode_err)?;

    Ok(EncodedChunk {
        index,
        path: generate_filename(index),
        bytes,
        rows,
    })
}

/// Encode the whole batch, one file per chunk.
pub fn encode_chunks(
    batch: &RecordBatch,
    chunk_size: usize,
    compression: ParquetCompression,
) -> Result<Vec<EncodedChunk>, WriteError> {
    chunk_ranges(batch.num_rows(), chunk_size)
        .into_iter()
        .enumerate()
        .map(|(index, (offset, len))| encode_chunk(batch, index, offset, len, compression))
        .collect()
}

fn footer_row_count(bytes: &Bytes) -> Result<usize, deltalake::parquet::errors::ParquetError> {
    let reader = SerializedFileReader::new(bytes.clone())?;
    Ok(reader
        .metadata()
        .row_groups()
        .iter()
        .map(|rg| rg.num_rows() as usize)
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_delimited;

    fn batch_of(rows: usize) -> RecordBatch {
        let mut csv = String::from("model,price\n");
        for i in 0..rows {
            csv.push_str(&format!("car-{i},{}\n", 1000 + i));
        }
        parse_delimited(csv.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_chunk_ranges() {
        assert!(chunk_ranges(0, 10).is_empty());
        assert_eq!(chunk_ranges(10, 10), vec![(0, 10)]);
        assert_eq!(chunk_ranges(25, 10), vec![(0, 10), (10, 10), (20, 5)]);
        assert_eq!(chunk_ranges(3, 100_000), vec![(0, 3)]);
    }

    #[test]
    fn test_encode_chunks_preserves_rows() {
        let batch = batch_of(250);
        let chunks = encode_chunks(&batch, 100, ParquetCompression::Snappy).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.rows).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert!(chunks.iter().all(|c| c.size() > 0));
    }

    #[test]
    fn test_chunk_names_are_unique() {
        let batch = batch_of(30);
        let chunks = encode_chunks(&batch, 10, ParquetCompression::Zstd).unwrap();
        let mut names: Vec<_> = chunks.iter().map(|c| c.path.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.ends_with(".parquet")));
    }

    #[test]
    fn test_every_codec_encodes() {
        let batch = batch_of(5);
        for codec in [
            ParquetCompression::Uncompressed,
            ParquetCompression::Snappy,
            ParquetCompression::Gzip,
            ParquetCompression::Zstd,
            ParquetCompression::Lz4,
        ] {
            let chunk = encode_chunk(&batch, 0, 0, 5, codec).unwrap();
            assert_eq!(chunk.rows, 5, "codec {codec:?}");
        }
    }
}
