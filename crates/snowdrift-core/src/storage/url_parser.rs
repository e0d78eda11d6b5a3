//! URL parsing for storage backends.
//!
//! Extracts backend configuration from S3 URLs and local filesystem paths.

use object_store::path::Path;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{LocalConfig, S3Config};

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static HashMap<Backend, Vec<Regex>> {
    static MATCHERS: OnceLock<HashMap<Backend, Vec<Regex>>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("storage URL pattern must compile"))
                .collect()
        };

        let mut m = HashMap::new();
        m.insert(
            Backend::S3,
            compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
        );
        m.insert(Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH]));
        m
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    ///
    /// Relative filesystem paths are resolved against the working directory.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        if !url.is_empty() && !url.contains(':') && !url.starts_with('/') {
            let absolute = std::env::current_dir()
                .map_err(|_| {
                    InvalidUrlSnafu {
                        url: url.to_string(),
                    }
                    .build()
                })?
                .join(url);
            return Ok(BackendConfig::Local(LocalConfig {
                path: absolute.to_string_lossy().into_owned(),
            }));
        }

        for (k, v) in matchers() {
            if let Some(matches) = v.iter().find_map(|r| r.captures(url)) {
                return match k {
                    Backend::S3 => Ok(Self::parse_s3(&matches)),
                    Backend::Local => Ok(Self::parse_local(&matches)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches
            .name("bucket")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = matches.name("path").map(|m| m.as_str()).unwrap_or("");
        let path = if path.starts_with('/') {
            path.trim_end_matches('/').to_string()
        } else {
            format!("/{}", path.trim_end_matches('/'))
        };

        BackendConfig::Local(LocalConfig { path })
    }

    /// Key prefix below the bucket or filesystem root.
    pub(crate) fn key(&self) -> Option<Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.clone(),
            BackendConfig::Local(local) => Some(Path::from(local.path.as_str())),
        }
    }

    /// Build a URL for a location below this backend's root.
    ///
    /// Used to hand table locations to libraries that take URLs.
    pub fn child_url(&self, segments: &[&str]) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let base = match self {
            BackendConfig::S3(s3) => {
                if let Some(key) = &s3.key {
                    parts.extend(key.as_ref().split('/').filter(|p| !p.is_empty()));
                }
                format!("s3://{}", s3.bucket)
            }
            BackendConfig::Local(local) => {
                parts.extend(local.path.split('/').filter(|p| !p.is_empty()));
                "file://".to_string()
            }
        };
        parts.extend(segments.iter().copied().filter(|s| !s.is_empty()));
        format!("{base}/{}", parts.join("/"))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, BackendConfig::Local(_))
    }
}
