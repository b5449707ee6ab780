//! CSV input
//!
//! Rows are read lazily and in file order. The reader is flexible: rows with
//! a different number of fields than their neighbours are still yielded, and
//! validation decides what to do with them.

use csv2db_common::Record;
use futures::stream::{BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Stream of rows handed to the producer pipeline.
pub type RecordStream = BoxStream<'static, Result<Record, SourceError>>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open input file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input: {0}")]
    Read(#[from] csv_async::Error),
}

/// Open `path` as a CSV source.
///
/// A missing or unreadable file fails here, before any row is read.
pub async fn open_csv(path: impl AsRef<Path>, has_headers: bool) -> Result<RecordStream, SourceError> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(csv_records(file, has_headers))
}

/// Read CSV rows from any async reader.
///
/// With `has_headers` the first row is consumed as a header and never yielded.
pub fn csv_records<R>(reader: R, has_headers: bool) -> RecordStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    csv_async::AsyncReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .create_reader(reader)
        .into_records()
        .map(|row| {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            Ok(Record::new(line, row.iter().map(str::to_owned).collect()))
        })
        .boxed()
}
