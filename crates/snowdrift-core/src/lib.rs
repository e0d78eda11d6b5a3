//! snowdrift-core: Shared components for the snowdrift loaders.
//!
//! - `period` - Execution date to run period resolution
//! - `storage/` - Object storage abstraction (S3, local)
//! - `metrics/` - Prometheus metrics with textfile export
//! - `config/` - Config providers, YAML loading and variable interpolation
//! - `error` - Common error types
//! - `tracing` - Subscriber setup

pub mod config;
pub mod error;
pub mod metrics;
pub mod period;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{
    ChainProvider, ConfigProvider, EnvProvider, MapProvider, MetricsConfig, SecretsFileProvider,
};
pub use error::{ConfigError, MetricsError, PeriodError, StorageError};
pub use metrics::MetricsController;
pub use period::{RunPeriod, resolve};
pub use storage::{BackendConfig, StorageProvider, StorageProviderRef};
pub use tracing::init_tracing;
