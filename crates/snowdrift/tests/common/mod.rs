//! Shared fixtures for the loader integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deltalake::arrow::array::RecordBatch;

use snowdrift::config::SinkConfig;
use snowdrift::error::{ConnectionError, WriteError};
use snowdrift::source::{SourceLocator, SourceReader};
use snowdrift::warehouse::{TableRef, WriteReceipt, WriteRequest};
use snowdrift::{BatchLoader, Warehouse, WarehouseConnection};
use snowdrift_core::storage::StorageProvider;

pub const HEADER: &str = "sale_id,sale_date,car_make,car_model,price,commission_rate";

/// Write `rows` data lines under `dir/name` and return the path.
pub fn write_source(dir: &Path, name: &str, rows: usize) -> std::path::PathBuf {
    let mut contents = String::from(HEADER);
    contents.push('\n');
    for i in 0..rows {
        contents.push_str(&format!(
            "{i},2024-03-{:02},Toyota,Corolla,{}.50,0.0{}\n",
            i % 28 + 1,
            20_000 + i,
            i % 9 + 1
        ));
    }
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// A loader reading `car_sales_data_*` files from `dir`.
pub async fn loader_for<W: Warehouse>(dir: &Path, warehouse: W, sink: SinkConfig) -> BatchLoader<W> {
    let storage = StorageProvider::for_url_with_options(&dir.to_string_lossy(), Default::default())
        .await
        .unwrap();
    BatchLoader::new(
        SourceLocator::new("car_sales_data", "csv"),
        SourceReader::new(Arc::new(storage), b',', "car_sales_data"),
        warehouse,
        sink,
    )
}

/// How the fake warehouse responds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Accept,
    /// Every connect fails with rejected credentials.
    RejectAuth,
    /// Connects fail with rejected credentials this many times, then succeed.
    RejectAuthTimes(usize),
    /// Coordinates are missing.
    MissingCoordinates,
    /// The bulk write fails with a retryable error.
    FailWrite,
    /// The write reports this many fewer rows than it received.
    DropRows(usize),
    /// The source was already committed at this version.
    AlreadyCommitted(i64),
}

/// Counters shared between a test and its fake warehouse.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub connects: AtomicUsize,
    pub releases: AtomicUsize,
    pub writes: AtomicUsize,
    pub batches: Mutex<Vec<RecordBatch>>,
    pub source_ids: Mutex<Vec<String>>,
}

impl FakeStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<RecordBatch> {
        self.batches.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct FakeWarehouse {
    behavior: Behavior,
    stats: Arc<FakeStats>,
}

impl FakeWarehouse {
    pub fn new(behavior: Behavior) -> (Self, Arc<FakeStats>) {
        let stats = Arc::new(FakeStats::default());
        (
            Self {
                behavior,
                stats: stats.clone(),
            },
            stats,
        )
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    type Connection = FakeConnection;

    async fn connect(&self, schema: &str, table: &str) -> Result<FakeConnection, ConnectionError> {
        let attempt = self.stats.connects.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            Behavior::RejectAuth => {
                return Err(ConnectionError::Unauthorized {
                    user: "loader".to_string(),
                    message: "incorrect username or password".to_string(),
                });
            }
            Behavior::RejectAuthTimes(times) if attempt <= times => {
                return Err(ConnectionError::Unauthorized {
                    user: "loader".to_string(),
                    message: "token expired".to_string(),
                });
            }
            Behavior::MissingCoordinates => {
                return Err(ConnectionError::MissingCoordinates {
                    keys: vec!["WAREHOUSE_ACCOUNT".to_string()],
                });
            }
            _ => {}
        }

        Ok(FakeConnection {
            behavior: self.behavior,
            stats: self.stats.clone(),
            table: TableRef::new("ANALYTICS", schema, table),
            version: 0,
        })
    }
}

pub struct FakeConnection {
    behavior: Behavior,
    stats: Arc<FakeStats>,
    table: TableRef,
    version: i64,
}

#[async_trait]
impl WarehouseConnection for FakeConnection {
    fn table_ref(&self) -> &TableRef {
        &self.table
    }

    async fn committed_version(&mut self, _source_id: &str) -> Result<Option<i64>, WriteError> {
        match self.behavior {
            Behavior::AlreadyCommitted(version) => Ok(Some(version)),
            _ => Ok(None),
        }
    }

    async fn bulk_write(
        &mut self,
        batch: RecordBatch,
        request: &WriteRequest,
    ) -> Result<WriteReceipt, WriteError> {
        self.stats.writes.fetch_add(1, Ordering::SeqCst);

        if self.behavior == Behavior::FailWrite {
            return Err(WriteError::Rejected {
                message: "warehouse unavailable".to_string(),
            });
        }

        let rows = batch.num_rows();
        let dropped = match self.behavior {
            Behavior::DropRows(n) => n.min(rows),
            _ => 0,
        };

        self.stats.batches.lock().unwrap().push(batch);
        self.stats
            .source_ids
            .lock()
            .unwrap()
            .push(request.source_id.clone());
        self.version += 1;

        Ok(WriteReceipt {
            rows_written: rows - dropped,
            version: self.version,
            chunks: rows.div_ceil(request.chunk_size),
        })
    }

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}
