//! Object storage abstraction.
//!
//! Provides a single interface over S3 and the local filesystem, used both
//! to locate monthly source files and to host the warehouse tables.

mod local;
mod s3;
mod url_parser;

pub use url_parser::BackendConfig;

use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

fn record(operation: StorageOperation, ok: bool, start: Instant) {
    let status = if ok {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Check whether an object exists at `path`.
    ///
    /// A missing object is `Ok(false)`; any other failure is an error.
    pub async fn exists(&self, path: impl Into<Path>) -> Result<bool, StorageError> {
        Ok(self.head(path).await?.is_some())
    }

    /// Fetch object metadata, or `None` when nothing exists at `path`.
    pub async fn head(&self, path: impl Into<Path>) -> Result<Option<ObjectMeta>, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.head(&self.qualify_path(&path)).await;

        match result {
            Ok(meta) => {
                record(StorageOperation::Head, true, start);
                Ok(Some(meta))
            }
            Err(object_store::Error::NotFound { .. }) => {
                record(StorageOperation::Head, true, start);
                Ok(None)
            }
            Err(source) => {
                record(StorageOperation::Head, false, start);
                Err(StorageError::ObjectStore { source })
            }
        }
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        record(StorageOperation::Get, result.is_ok(), start);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// URL of a location below this provider's root, for libraries that
    /// open their own stores.
    pub fn child_url(&self, segments: &[&str]) -> String {
        self.config.child_url(segments)
    }

    /// Get storage options for external integrations (e.g., Delta Lake).
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local(dir: &std::path::Path) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_exists_and_get() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("car_sales_data_2024_03.csv"), b"a,b\n1,2\n").unwrap();

        let storage = local(temp_dir.path()).await;
        assert!(storage.exists("car_sales_data_2024_03.csv").await.unwrap());
        assert!(!storage.exists("car_sales_data_2024_04.csv").await.unwrap());

        let content = storage.get("car_sales_data_2024_03.csv").await.unwrap();
        assert_eq!(&content[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_missing_root_is_not_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("not-there-yet");

        let storage = local(&root).await;
        assert!(!storage.exists("anything.csv").await.unwrap());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local(temp_dir.path()).await;

        let err = storage.get("missing.csv").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_qualify_path_prepends_root() {
        let storage = local(std::path::Path::new("/var/lake")).await;
        let path = Path::from("file.csv");
        assert_eq!(
            storage.qualify_path(&path).into_owned(),
            Path::from("var/lake/file.csv")
        );
    }
}
