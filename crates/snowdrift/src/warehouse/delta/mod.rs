//! Delta Lake warehouse.
//!
//! Tables live at `<account>/<database>/<schema>/<table>` with lower-cased
//! path segments. A bulk write encodes the batch as Parquet chunks, uploads
//! them in parallel, then registers all of them in one commit together with a
//! `Txn` action naming the source. Chunks from a write that never reached the
//! log are deleted and never become visible.

mod actions;
mod chunk;
mod commit;
mod table;

pub use actions::{TXN_APP_ID_PREFIX, txn_app_id};
pub use chunk::{EncodedChunk, chunk_ranges, encode_chunks};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deltalake::DeltaTable;
use deltalake::arrow::array::RecordBatch;
use deltalake::logstore::ObjectStoreRef;
use futures::{StreamExt, stream};
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, info, warn};
use url::Url;

use snowdrift_core::config::ConfigProvider;
use snowdrift_core::emit;
use snowdrift_core::error::StorageError;
use snowdrift_core::metrics::events::ChunkUploaded;
use snowdrift_core::storage::StorageProvider;

use super::{
    TableRef, Warehouse, WarehouseConnection, WarehouseCoordinates, WriteReceipt, WriteRequest,
};
use crate::error::{ConnectionError, EmptyBatchSnafu, WriteError};

use actions::{add_record_count, create_add_action, create_txn_action};
use commit::commit_append;
use table::{
    create_table, ensure_columns_match, ensure_handlers_registered, table_columns, try_open_table,
};

/// Delta Lake tables under the account root.
///
/// Coordinates are resolved on each connect, so a run that never connects
/// never needs them.
#[derive(Clone)]
pub struct DeltaWarehouse {
    provider: Arc<dyn ConfigProvider>,
    extra_options: HashMap<String, String>,
}

impl std::fmt::Debug for DeltaWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeltaWarehouse<{}>", self.provider.describe())
    }
}

impl DeltaWarehouse {
    /// `extra_options` are merged under the credentials from the coordinates.
    pub fn new(provider: Arc<dyn ConfigProvider>, extra_options: HashMap<String, String>) -> Self {
        Self {
            provider,
            extra_options,
        }
    }
}

/// URL of the table directory, creating it first for local accounts.
async fn table_url(
    coordinates: &WarehouseCoordinates,
    storage_options: &HashMap<String, String>,
    table_ref: &TableRef,
) -> Result<Url, ConnectionError> {
    let invalid = |source: StorageError| ConnectionError::InvalidAccount {
        account: coordinates.account.clone(),
        source,
    };

    let storage =
        StorageProvider::for_url_with_options(&coordinates.account, storage_options.clone())
            .await
            .map_err(invalid)?;

    let [database, schema, table] = table_ref.path_segments();
    let mut location = storage.child_url(&[&database, &schema, &table]);
    location.push('/');

    let url = Url::parse(&location).map_err(|_| {
        invalid(StorageError::InvalidUrl {
            url: location.clone(),
        })
    })?;

    // Local tables need their directory before the log can be listed.
    if storage.config().is_local()
        && let Ok(path) = url.to_file_path()
    {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| ConnectionError::PrepareLocation {
                location: location.clone(),
                source,
            })?;
    }

    Ok(url)
}

#[async_trait]
impl Warehouse for DeltaWarehouse {
    type Connection = DeltaConnection;

    async fn connect(&self, schema: &str, table: &str) -> Result<DeltaConnection, ConnectionError> {
        ensure_handlers_registered();

        let coordinates = WarehouseCoordinates::from_provider(self.provider.as_ref())?;
        let storage_options = coordinates.storage_options(&self.extra_options);
        let table_ref = TableRef::new(&coordinates.database, schema, table);

        let url = table_url(&coordinates, &storage_options, &table_ref).await?;
        let table_name = table_ref.to_string();
        let table =
            try_open_table(&url, &storage_options, &table_name, coordinates.principal()).await?;

        info!(
            target = %table_name,
            location = %url,
            role = coordinates.role.as_deref().unwrap_or("-"),
            compute = coordinates.compute.as_deref().unwrap_or("-"),
            "Connected to warehouse"
        );

        Ok(DeltaConnection {
            table,
            url,
            storage_options,
            table_ref,
            table_name,
            role: coordinates.role,
            compute: coordinates.compute,
        })
    }
}

/// An open Delta table, or the location where one will be created.
pub struct DeltaConnection {
    table: Option<DeltaTable>,
    url: Url,
    storage_options: HashMap<String, String>,
    table_ref: TableRef,
    /// Table identifier for logging and metrics.
    table_name: String,
    role: Option<String>,
    compute: Option<String>,
}

/// The open table, creating it from `schema` on first use.
///
/// An existing table must already have the incoming columns.
async fn table_for<'a>(
    slot: &'a mut Option<DeltaTable>,
    url: &Url,
    storage_options: &HashMap<String, String>,
    schema: &deltalake::arrow::datatypes::Schema,
    table_name: &str,
) -> Result<&'a mut DeltaTable, WriteError> {
    match slot.take() {
        Some(table) => {
            let columns = table_columns(&table);
            let table = slot.insert(table);
            ensure_columns_match(schema, &columns?)?;
            Ok(table)
        }
        None => {
            let created = create_table(url, storage_options, schema, table_name).await?;
            Ok(slot.insert(created))
        }
    }
}

/// Audit metadata recorded with the commit.
fn app_metadata(
    request: &WriteRequest,
    role: Option<&str>,
    compute: Option<&str>,
    rows: usize,
    chunks: usize,
) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::from([
        ("loader".to_string(), serde_json::json!("snowdrift")),
        ("source".to_string(), serde_json::json!(request.source_id)),
        ("rows".to_string(), serde_json::json!(rows)),
        ("chunks".to_string(), serde_json::json!(chunks)),
    ]);
    if let Some(role) = role {
        metadata.insert("role".to_string(), serde_json::json!(role));
    }
    if let Some(compute) = compute {
        metadata.insert("compute".to_string(), serde_json::json!(compute));
    }
    metadata
}

/// Upload every chunk, returning the ones that landed and the first failure.
async fn upload_chunks(
    store: &ObjectStoreRef,
    chunks: Vec<EncodedChunk>,
    parallelism: usize,
    table_name: &str,
) -> (Vec<EncodedChunk>, Option<WriteError>) {
    let results: Vec<Result<EncodedChunk, WriteError>> = stream::iter(chunks)
        .map(|chunk| {
            let store = store.clone();
            async move {
                let path = Path::from(chunk.path.as_str());
                store
                    .put(&path, PutPayload::from(chunk.bytes.clone()))
                    .await
                    .map_err(|source| WriteError::Upload {
                        path: chunk.path.clone(),
                        source,
                    })?;
                Ok(chunk)
            }
        })
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await;

    let mut uploaded = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(chunk) => {
                emit!(ChunkUploaded {
                    rows: chunk.rows as u64,
                    bytes: chunk.size() as u64,
                    table: table_name.to_string(),
                });
                uploaded.push(chunk);
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    uploaded.sort_by_key(|c| c.index);
    (uploaded, first_error)
}

/// Version recorded by the latest `Txn` for `source_id`.
///
/// Read from the snapshot, so loads folded into a checkpoint are still found.
async fn recorded_txn_version(
    table: &DeltaTable,
    source_id: &str,
) -> Result<Option<i64>, WriteError> {
    let snapshot = table
        .snapshot()
        .map_err(|source| WriteError::LogScan { source })?;
    snapshot
        .transaction_version(table.log_store().as_ref(), txn_app_id(source_id))
        .await
        .map_err(|source| WriteError::LogScan { source })
}

/// Whether a commit that reported failure reached the log anyway.
///
/// `Err` means the log could not be read back and the outcome is unknown.
async fn find_landed_commit(
    table: &mut DeltaTable,
    source_id: &str,
    txn_version: i64,
) -> Result<Option<i64>, WriteError> {
    table
        .load()
        .await
        .map_err(|source| WriteError::LogScan { source })?;
    let recorded = recorded_txn_version(table, source_id).await?;
    Ok(recorded.filter(|version| *version == txn_version))
}

/// Best-effort removal of chunk files that will never be committed.
async fn delete_orphans(store: &ObjectStoreRef, chunks: &[EncodedChunk], table_name: &str) {
    for chunk in chunks {
        if let Err(e) = store.delete(&Path::from(chunk.path.as_str())).await {
            warn!(target = %table_name, path = %chunk.path, "Failed to delete orphaned chunk: {}", e);
        }
    }
    if !chunks.is_empty() {
        debug!(target = %table_name, count = chunks.len(), "Deleted orphaned chunks");
    }
}

#[async_trait]
impl WarehouseConnection for DeltaConnection {
    fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    async fn committed_version(&mut self, source_id: &str) -> Result<Option<i64>, WriteError> {
        let Some(table) = &self.table else {
            return Ok(None);
        };
        if table.version().is_none() {
            return Ok(None);
        }

        let version = recorded_txn_version(table, source_id).await?;
        if let Some(version) = version {
            debug!(target = %self.table_name, source = source_id, version, "Found earlier load");
        }
        Ok(version)
    }

    async fn bulk_write(
        &mut self,
        batch: RecordBatch,
        request: &WriteRequest,
    ) -> Result<WriteReceipt, WriteError> {
        ensure!(batch.num_rows() > 0, EmptyBatchSnafu);

        let schema = batch.schema();
        let table = table_for(
            &mut self.table,
            &self.url,
            &self.storage_options,
            &schema,
            &self.table_name,
        )
        .await?;
        let txn_version = table.version().unwrap_or(-1) + 1;
        let store = table.log_store().object_store(None);

        let chunks = encode_chunks(&batch, request.chunk_size, request.compression)?;
        let chunk_count = chunks.len();
        debug!(
            target = %self.table_name,
            rows = batch.num_rows(),
            chunks = chunk_count,
            "Encoded batch"
        );

        let (uploaded, failure) = upload_chunks(
            &store,
            chunks,
            request.upload_parallelism,
            &self.table_name,
        )
        .await;
        if let Some(err) = failure {
            delete_orphans(&store, &uploaded, &self.table_name).await;
            return Err(err);
        }

        let mut actions = Vec::with_capacity(uploaded.len() + 1);
        actions.push(create_txn_action(&request.source_id, txn_version));
        actions.extend(uploaded.iter().map(create_add_action));
        let rows_written: usize = actions.iter().filter_map(add_record_count).sum();

        let metadata = app_metadata(
            request,
            self.role.as_deref(),
            self.compute.as_deref(),
            rows_written,
            chunk_count,
        );

        let version = match commit_append(table, actions, metadata, &self.table_name).await {
            Ok(version) => version,
            Err(err) => match find_landed_commit(table, &request.source_id, txn_version).await {
                Ok(Some(version)) => {
                    warn!(
                        target = %self.table_name,
                        version,
                        "Commit reported failure but is in the log: {}",
                        err
                    );
                    version
                }
                Ok(None) => {
                    delete_orphans(&store, &uploaded, &self.table_name).await;
                    return Err(err);
                }
                Err(check) => {
                    warn!(
                        target = %self.table_name,
                        chunks = uploaded.len(),
                        "Keeping uploaded chunks, commit state unknown: {}",
                        check
                    );
                    return Err(err);
                }
            },
        };

        info!(
            target = %self.table_name,
            rows = rows_written,
            chunks = chunk_count,
            version,
            "Committed bulk write"
        );

        Ok(WriteReceipt {
            rows_written,
            version,
            chunks: chunk_count,
        })
    }

    fn release(&mut self) {
        self.table = None;
        debug!(target = %self.table_name, "Released warehouse connection");
    }
}
