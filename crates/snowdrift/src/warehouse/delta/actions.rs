//! Delta Lake action creation.
//!
//! - Add actions registering uploaded chunk files
//! - Txn actions tagging a commit with the source it loaded

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use deltalake::kernel::{Action, Add, Transaction};
use tracing::debug;

use super::chunk::EncodedChunk;

/// Prefix for snowdrift app ids in Delta Txn actions.
pub const TXN_APP_ID_PREFIX: &str = "snowdrift:";

/// App id marking commits that loaded `source_id`.
pub fn txn_app_id(source_id: &str) -> String {
    format!("{TXN_APP_ID_PREFIX}{source_id}")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Create a Delta Lake Add action for an uploaded chunk.
pub fn create_add_action(chunk: &EncodedChunk) -> Action {
    debug!(path = %chunk.path, rows = chunk.rows, "Creating add action");

    let stats = serde_json::json!({ "numRecords": chunk.rows }).to_string();

    Action::Add(Add {
        path: chunk.path.trim_start_matches('/').to_string(),
        size: i64::try_from(chunk.size()).unwrap_or(i64::MAX),
        partition_values: HashMap::new(),
        modification_time: now_millis(),
        data_change: true,
        stats: Some(stats),
        ..Default::default()
    })
}

/// Create a Txn action recording which source a commit loaded.
///
/// `version` must grow with each commit for the same app id.
pub fn create_txn_action(source_id: &str, version: i64) -> Action {
    Action::Txn(Transaction {
        app_id: txn_app_id(source_id),
        version,
        last_updated: Some(now_millis()),
    })
}

/// Rows recorded in an Add action's statistics.
pub fn add_record_count(action: &Action) -> Option<usize> {
    let Action::Add(add) = action else {
        return None;
    };
    let stats: serde_json::Value = serde_json::from_str(add.stats.as_deref()?).ok()?;
    stats
        .get("numRecords")?
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk(path: &str, rows: usize) -> EncodedChunk {
        EncodedChunk {
            index: 0,
            path: path.to_string(),
            bytes: Bytes::from_static(b"PAR1....PAR1"),
            rows,
        }
    }

    #[test]
    fn test_create_add_action() {
        let action = create_add_action(&chunk("part-00000-x.parquet", 500));

        match &action {
            Action::Add(add) => {
                assert_eq!(add.path, "part-00000-x.parquet");
                assert_eq!(add.size, 12);
                assert!(add.data_change);
                assert!(add.partition_values.is_empty());
            }
            _ => panic!("Expected Add action"),
        }
        assert_eq!(add_record_count(&action), Some(500));
    }

    #[test]
    fn test_create_add_action_strips_leading_slash() {
        let action = create_add_action(&chunk("/part-00001-y.parquet", 1));
        match action {
            Action::Add(add) => assert_eq!(add.path, "part-00001-y.parquet"),
            _ => panic!("Expected Add action"),
        }
    }

    #[test]
    fn test_create_txn_action() {
        let action = create_txn_action("car_sales_data_2024_3.csv", 7);

        match action {
            Action::Txn(txn) => {
                assert_eq!(txn.app_id, "snowdrift:car_sales_data_2024_3.csv");
                assert_eq!(txn.version, 7);
                assert!(txn.last_updated.is_some());
            }
            _ => panic!("Expected Txn action"),
        }
    }

    #[test]
    fn test_record_count_ignores_other_actions() {
        assert_eq!(add_record_count(&create_txn_action("x", 1)), None);
    }
}
