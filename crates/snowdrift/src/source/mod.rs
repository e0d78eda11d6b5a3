//! Monthly source files.
//!
//! A [`SourceLocator`] maps a run period to the one file expected for it, and
//! a [`SourceReader`] checks for and reads that file from storage.

mod reader;

pub use reader::{SourceReader, parse_delimited};

use std::fmt;

use snowdrift_core::period::RunPeriod;

use crate::config::SourceConfig;

/// The file expected for one run period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    name: String,
}

impl SourceFile {
    /// File name relative to the source root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier recorded with the commit, stable across retries.
    pub fn source_id(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Maps run periods to file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    prefix: String,
    extension: String,
}

impl SourceLocator {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(&config.prefix, &config.extension)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>_<year>_<month>.<extension>`, with a four-digit year and an
    /// unpadded month.
    pub fn resolve_path(&self, period: &RunPeriod) -> SourceFile {
        SourceFile {
            name: format!(
                "{}_{:04}_{}.{}",
                self.prefix,
                period.year(),
                period.month(),
                self.extension
            ),
        }
    }
}
