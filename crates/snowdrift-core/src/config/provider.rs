//! Configuration value providers.
//!
//! Connection coordinates and secrets are looked up by key through a
//! [`ConfigProvider`] instead of reading the process environment directly.
//! Providers compose with [`ChainProvider`], which asks each source in order
//! and returns the first hit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;
use tracing::debug;

use crate::error::ConfigError;

/// A source of configuration values keyed by name.
pub trait ConfigProvider: Send + Sync {
    /// Look up a single key.
    fn lookup(&self, key: &str) -> Option<String>;

    /// Short label used in diagnostics.
    fn describe(&self) -> String;
}

/// Reads values from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProvider;

impl ConfigProvider for EnvProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn describe(&self) -> String {
        "environment".to_string()
    }
}

/// In-memory provider, mostly useful for tests and programmatic setups.
#[derive(Debug, Clone, Default)]
pub struct MapProvider {
    values: HashMap<String, String>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigProvider for MapProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn describe(&self) -> String {
        format!("map ({} keys)", self.values.len())
    }
}

/// Flat YAML mapping of secret names to scalar values.
///
/// ```yaml
/// WAREHOUSE_USER: loader
/// WAREHOUSE_PASSWORD: "s3cr3t"
/// ```
#[derive(Debug, Clone)]
pub struct SecretsFileProvider {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl SecretsFileProvider {
    /// Load a secrets file from disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &contents)
    }

    fn from_yaml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let shape_error = || ConfigError::SecretsShape {
            path: path.to_path_buf(),
        };

        let parsed: Value =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })?;

        let mapping = match parsed {
            Value::Mapping(mapping) => mapping,
            // An empty file parses as null; treat it as an empty store.
            Value::Null => Default::default(),
            _ => return Err(shape_error()),
        };

        let mut values = HashMap::with_capacity(mapping.len());
        for (key, value) in mapping {
            let Value::String(key) = key else {
                return Err(shape_error());
            };
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(shape_error()),
            };
            values.insert(key, value);
        }

        debug!(path = %path.display(), keys = values.len(), "Loaded secrets file");
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }
}

impl ConfigProvider for SecretsFileProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn describe(&self) -> String {
        format!("secrets file {}", self.path.display())
    }
}

/// Ordered chain of providers; the first provider that knows a key wins.
#[derive(Clone, Default)]
pub struct ChainProvider {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider with lower precedence than those already added.
    pub fn then(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Environment first, then an optional secrets file.
    pub fn standard(secrets: Option<&Path>) -> Result<Self, ConfigError> {
        let chain = Self::new().then(EnvProvider);
        match secrets {
            Some(path) => Ok(chain.then(SecretsFileProvider::from_file(path)?)),
            None => Ok(chain),
        }
    }
}

impl std::fmt::Debug for ChainProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainProvider[{}]", self.describe())
    }
}

impl ConfigProvider for ChainProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| p.lookup(key))
    }

    fn describe(&self) -> String {
        self.providers
            .iter()
            .map(|p| p.describe())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile() -> NamedTempFile {
        tempfile::Builder::new().suffix(".yaml").tempfile().unwrap()
    }

    #[test]
    fn test_chain_prefers_earlier_provider() {
        let chain = ChainProvider::new()
            .then(MapProvider::new().with("USER", "from-first"))
            .then(
                MapProvider::new()
                    .with("USER", "from-second")
                    .with("ROLE", "loader"),
            );

        assert_eq!(chain.lookup("USER").as_deref(), Some("from-first"));
        assert_eq!(chain.lookup("ROLE").as_deref(), Some("loader"));
        assert_eq!(chain.lookup("MISSING"), None);
    }

    #[test]
    fn test_chain_keeps_empty_value_from_earlier_provider() {
        let chain = ChainProvider::new()
            .then(MapProvider::new().with("USER", ""))
            .then(MapProvider::new().with("USER", "fallback"));

        assert_eq!(chain.lookup("USER").as_deref(), Some(""));
    }

    #[test]
    fn test_secrets_file_scalars() {
        let mut file = yaml_tempfile();
        writeln!(
            file,
            "WAREHOUSE_USER: loader\nWAREHOUSE_PASSWORD: \"0042\"\nPORT: 443\nSECURE: true"
        )
        .unwrap();

        let provider = SecretsFileProvider::from_file(file.path()).unwrap();
        assert_eq!(provider.lookup("WAREHOUSE_USER").as_deref(), Some("loader"));
        assert_eq!(provider.lookup("WAREHOUSE_PASSWORD").as_deref(), Some("0042"));
        assert_eq!(provider.lookup("PORT").as_deref(), Some("443"));
        assert_eq!(provider.lookup("SECURE").as_deref(), Some("true"));
    }

    #[test]
    fn test_secrets_file_rejects_nested_values() {
        let mut file = yaml_tempfile();
        writeln!(file, "warehouse:\n  user: loader").unwrap();

        let err = SecretsFileProvider::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::SecretsShape { .. }));
    }

    #[test]
    fn test_secrets_file_empty_is_empty_store() {
        let file = yaml_tempfile();
        let provider = SecretsFileProvider::from_file(file.path()).unwrap();
        assert_eq!(provider.lookup("ANY"), None);
    }

    #[test]
    fn test_missing_secrets_file() {
        let err = SecretsFileProvider::from_file(Path::new("/nonexistent/secrets.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_standard_chain_description() {
        let chain = ChainProvider::standard(None).unwrap();
        assert_eq!(chain.describe(), "environment");
    }
}
