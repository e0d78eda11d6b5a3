//! Snowdrift: monthly flat-file loader into an append-only Delta Lake raw zone.
//!
//! This crate handles:
//! - Locating the monthly source file for a scheduler execution date
//! - Reading it as all-text delimited data
//! - Stamping each row with its source file and load time
//! - Appending the rows to the warehouse table in a single atomic commit

pub mod app;
pub mod backfill;
pub mod config;
pub mod error;
pub mod loader;
pub mod provenance;
pub mod source;
pub mod warehouse;

// Re-export commonly used items
pub use backfill::{Backfill, BackfillSummary, RetryPolicy};
pub use config::LoaderConfig;
pub use error::{LoadError, SetupError};
pub use loader::{BatchLoader, LoadOutcome, Prepared, SkipReason};
pub use warehouse::{DeltaWarehouse, Warehouse, WarehouseConnection};

// Re-export from snowdrift-core
pub use snowdrift_core::{RunPeriod, init_tracing, resolve};
