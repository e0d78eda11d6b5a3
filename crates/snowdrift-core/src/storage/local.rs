//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Absolute directory path, without a trailing slash.
    pub path: String,
}

impl StorageProvider {
    /// The store is rooted at `/` and the configured directory becomes the
    /// key prefix, so a root that does not exist yet is never created here.
    pub(super) async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        let object_store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
        let canonical_url = format!("file://{}", config.path);

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            canonical_url,
            storage_options: HashMap::new(),
        })
    }
}
