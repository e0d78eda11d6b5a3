//! Warehouse abstraction.
//!
//! The loader talks to the warehouse only through [`Warehouse`] and
//! [`WarehouseConnection`], so tests can substitute a fake and other table
//! formats can be added without touching the load logic.

mod coordinates;
pub mod delta;

pub use coordinates::{
    ACCOUNT_KEY, COMPUTE_KEY, DATABASE_KEY, PASSWORD_KEY, ROLE_KEY, USER_KEY,
    WarehouseCoordinates,
};
pub use delta::{DeltaConnection, DeltaWarehouse};

use std::fmt;
use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use deltalake::arrow::array::RecordBatch;

use crate::config::ParquetCompression;
use crate::error::{ConnectionError, WriteError};

/// Fully qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Lower-cased storage path segments: database, schema, table.
    pub fn path_segments(&self) -> [String; 3] {
        [
            self.database.to_ascii_lowercase(),
            self.schema.to_ascii_lowercase(),
            self.table.to_ascii_lowercase(),
        ]
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Parameters of one bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Identifies the source file; recorded with the commit.
    pub source_id: String,
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Chunk uploads in flight.
    pub upload_parallelism: usize,
    pub compression: ParquetCompression,
}

/// What the warehouse reports after a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Rows the warehouse persisted.
    pub rows_written: usize,
    /// Table version created by the write.
    pub version: i64,
    /// Number of chunks registered.
    pub chunks: usize,
}

/// A warehouse the loader can connect to.
#[async_trait]
pub trait Warehouse: Send + Sync {
    type Connection: WarehouseConnection;

    /// Open a connection scoped to one table in the configured database.
    async fn connect(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Self::Connection, ConnectionError>;
}

/// An open, exclusively owned warehouse connection.
#[async_trait]
pub trait WarehouseConnection: Send {
    /// The table this connection writes to.
    fn table_ref(&self) -> &TableRef;

    /// Version of the earlier commit that loaded `source_id`, if any.
    async fn committed_version(&mut self, source_id: &str) -> Result<Option<i64>, WriteError>;

    /// Append `batch` to the table.
    ///
    /// Either every row becomes visible in a single commit or none does.
    /// Creates the table on first use.
    async fn bulk_write(
        &mut self,
        batch: RecordBatch,
        request: &WriteRequest,
    ) -> Result<WriteReceipt, WriteError>;

    /// Release the connection. Called exactly once by [`ConnectionGuard`].
    fn release(&mut self);
}

/// Releases its connection exactly once, when dropped or on [`release`].
///
/// Drop runs on every exit path including unwinding, so a connection held in
/// a guard cannot leak.
///
/// [`release`]: ConnectionGuard::release
pub struct ConnectionGuard<C: WarehouseConnection> {
    connection: C,
    released: bool,
}

impl<C: WarehouseConnection> ConnectionGuard<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            released: false,
        }
    }

    /// Release now instead of at end of scope.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.connection.release();
        }
    }
}

impl<C: WarehouseConnection> Deref for ConnectionGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C: WarehouseConnection> DerefMut for ConnectionGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.connection
    }
}

impl<C: WarehouseConnection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnection {
        table: TableRef,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WarehouseConnection for CountingConnection {
        fn table_ref(&self) -> &TableRef {
            &self.table
        }

        async fn committed_version(&mut self, _source_id: &str) -> Result<Option<i64>, WriteError> {
            Ok(None)
        }

        async fn bulk_write(
            &mut self,
            _batch: RecordBatch,
            _request: &WriteRequest,
        ) -> Result<WriteReceipt, WriteError> {
            Err(WriteError::Rejected {
                message: "not supported".to_string(),
            })
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guard() -> (ConnectionGuard<CountingConnection>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let guard = ConnectionGuard::new(CountingConnection {
            table: TableRef::new("ANALYTICS", "RAW", "CAR_SALES"),
            releases: releases.clone(),
        });
        (guard, releases)
    }

    #[test]
    fn test_drop_releases_once() {
        let (guard, releases) = guard();
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_release_is_not_repeated_on_drop() {
        let (guard, releases) = guard();
        guard.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_unwind() {
        let (guard, releases) = guard();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("write blew up");
        }));
        assert!(result.is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_table_ref_display_and_segments() {
        let table = TableRef::new("ANALYTICS", "RAW", "CAR_SALES");
        assert_eq!(table.to_string(), "ANALYTICS.RAW.CAR_SALES");
        assert_eq!(table.path_segments(), ["analytics", "raw", "car_sales"]);
    }
}
