//! Delta Lake commit logic.

use std::collections::HashMap;
use std::time::Instant;

use deltalake::DeltaTable;
use deltalake::kernel::Action;
use deltalake::kernel::transaction::CommitBuilder;
use deltalake::protocol::{DeltaOperation, SaveMode};
use tracing::{debug, warn};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::DeltaCommitCompleted;

use crate::error::WriteError;

/// Commit `actions` as a single append.
///
/// Either every action lands in the new version or none does. An `Err` is
/// only returned while the log entry is unwritten or its state is unknown.
/// Once the entry is written, post-commit and reload failures are logged
/// and the new version is returned.
pub async fn commit_append(
    table: &mut DeltaTable,
    actions: Vec<Action>,
    app_metadata: HashMap<String, serde_json::Value>,
    table_name: &str,
) -> Result<i64, WriteError> {
    let start = Instant::now();
    debug!(target = %table_name, actions = actions.len(), "Committing to Delta Lake");

    let post_commit = CommitBuilder::default()
        .with_actions(actions)
        .with_app_metadata(app_metadata)
        .build(
            Some(
                table
                    .snapshot()
                    .map_err(|source| WriteError::Commit { source })?,
            ),
            table.log_store(),
            DeltaOperation::Write {
                mode: SaveMode::Append,
                partition_by: None,
                predicate: None,
            },
        )
        .into_prepared_commit_future()
        .await
        .map_err(|source| WriteError::Commit { source })?
        .await
        .map_err(|source| WriteError::Commit { source })?;

    // The log entry is written from here on.
    let version = post_commit.version;

    if let Err(e) = post_commit.await {
        warn!(target = %table_name, version, "Post-commit step failed: {}", e);
    }
    if let Err(e) = table.load().await {
        warn!(target = %table_name, version, "Failed to reload table after commit: {}", e);
    }

    emit!(DeltaCommitCompleted {
        version,
        duration: start.elapsed(),
        table: table_name.to_string(),
    });

    Ok(version)
}
