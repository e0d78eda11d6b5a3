//! Configuration plumbing shared by the snowdrift binaries.

mod loader;
mod provider;
mod vars;

pub use loader::{is_yaml_file, load_yaml_file, parse_yaml};
pub use provider::{ChainProvider, ConfigProvider, EnvProvider, MapProvider, SecretsFileProvider};
pub use vars::{InterpolationResult, interpolate_with};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metrics export configuration.
///
/// Metrics are rendered to a Prometheus textfile when the run ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Path of the textfile to write (e.g. for the node-exporter textfile collector).
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}
