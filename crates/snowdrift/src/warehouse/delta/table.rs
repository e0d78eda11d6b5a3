//! Delta Lake table management.
//!
//! Opening, creating and inspecting the target table.

use std::collections::HashMap;

use deltalake::arrow::datatypes::Schema;
use deltalake::operations::create::CreateBuilder;
use deltalake::{DeltaTable, DeltaTableError};
use tracing::info;
use url::Url;

use crate::error::{ConnectionError, WriteError};

/// Ensure Delta Lake cloud storage handlers are registered.
///
/// This is idempotent - calling multiple times is safe.
pub fn ensure_handlers_registered() {
    deltalake::aws::register_handlers(None);
}

/// Whether an open failure means the table has not been created yet.
pub fn is_table_not_found(err: &DeltaTableError) -> bool {
    match err {
        DeltaTableError::NotATable(_) | DeltaTableError::InvalidTableLocation(_) => true,
        DeltaTableError::ObjectStore { source } => {
            matches!(source, object_store::Error::NotFound { .. })
        }
        _ => false,
    }
}

/// Whether an open failure means the credentials were refused.
pub fn is_unauthorized(err: &DeltaTableError) -> bool {
    match err {
        DeltaTableError::ObjectStore { source } => matches!(
            source,
            object_store::Error::Unauthenticated { .. }
                | object_store::Error::PermissionDenied { .. }
        ),
        _ => false,
    }
}

/// Open the table at `table_url`, or `None` when no table exists there yet.
pub async fn try_open_table(
    table_url: &Url,
    storage_options: &HashMap<String, String>,
    table_name: &str,
    principal: &str,
) -> Result<Option<DeltaTable>, ConnectionError> {
    match deltalake::open_table_with_storage_options(table_url.clone(), storage_options.clone())
        .await
    {
        Ok(table) => {
            info!(
                target = %table_name,
                "Opened existing Delta table at version {}",
                table.version().unwrap_or(-1)
            );
            Ok(Some(table))
        }
        Err(err) if is_table_not_found(&err) => {
            info!(target = %table_name, "No Delta table at {table_url} yet, creating on first write");
            Ok(None)
        }
        Err(err) if is_unauthorized(&err) => Err(ConnectionError::Unauthorized {
            user: principal.to_string(),
            message: err.to_string(),
        }),
        Err(source) => Err(ConnectionError::OpenTable {
            table: table_name.to_string(),
            source,
        }),
    }
}

/// Convert an Arrow schema to a Delta schema.
pub fn arrow_schema_to_delta(schema: &Schema) -> Result<deltalake::kernel::StructType, WriteError> {
    use deltalake::kernel::engine::arrow_conversion::TryIntoKernel;
    use deltalake::kernel::{DataType as DeltaType, StructField, StructType};

    let fields: Vec<StructField> = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type: DeltaType = field
                .data_type()
                .try_into_kernel()
                .map_err(|source| WriteError::SchemaConversion { source })?;
            Ok(StructField::new(
                field.name(),
                delta_type,
                field.is_nullable(),
            ))
        })
        .collect::<Result<Vec<_>, WriteError>>()?;

    StructType::try_new(fields).map_err(|e| WriteError::StructType {
        message: e.to_string(),
    })
}

/// Create the table with the schema of the first batch written to it.
pub async fn create_table(
    table_url: &Url,
    storage_options: &HashMap<String, String>,
    schema: &Schema,
    table_name: &str,
) -> Result<DeltaTable, WriteError> {
    info!(target = %table_name, "Creating new Delta table at {}", table_url);

    let delta_schema = arrow_schema_to_delta(schema)?;

    CreateBuilder::new()
        .with_location(table_url.as_str())
        .with_table_name(table_name)
        .with_columns(delta_schema.fields().cloned())
        .with_storage_options(storage_options.clone())
        .await
        .map_err(|source| WriteError::CreateTable { source })
}

/// Column names of an existing table, in order.
pub fn table_columns(table: &DeltaTable) -> Result<Vec<String>, WriteError> {
    let snapshot = table
        .snapshot()
        .map_err(|source| WriteError::LogScan { source })?;
    Ok(snapshot
        .schema()
        .fields()
        .map(|field| field.name().to_string())
        .collect())
}

/// Check that incoming columns match the table's, ignoring case.
pub fn ensure_columns_match(incoming: &Schema, existing: &[String]) -> Result<(), WriteError> {
    let incoming: Vec<String> = incoming
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();

    let matches = incoming.len() == existing.len()
        && incoming
            .iter()
            .zip(existing)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));

    if matches {
        Ok(())
    } else {
        Err(WriteError::SchemaMismatch {
            incoming,
            existing: existing.to_vec(),
        })
    }
}
