//! Prometheus recorder with textfile export.
//!
//! A load run is a short-lived process, so nothing scrapes it directly.
//! Metrics are rendered once at exit and written where a node exporter's
//! textfile collector picks them up.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{
    AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu, PrometheusInitSnafu,
    WriteTextfileSnafu,
};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0,
];

/// Global metrics controller singleton.
static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Controller for the process-wide Prometheus recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

fn build_controller() -> Result<MetricsController, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;
    Ok(MetricsController { handle })
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_global() -> Result<&'static MetricsController, MetricsError> {
    let controller = build_controller()?;
    CONTROLLER
        .set(controller)
        .map_err(|_| AlreadyInitializedSnafu.build())?;
    MetricsController::get()
}

/// Initialize the recorder for tests.
///
/// Safe to call from several test threads; losers of the race wait for the
/// winner to finish.
pub fn init_test() {
    if CONTROLLER.get().is_some() {
        return;
    }
    match build_controller() {
        Ok(controller) => {
            let _ = CONTROLLER.set(controller);
        }
        Err(_) => {
            while CONTROLLER.get().is_none() {
                std::hint::spin_loop();
            }
        }
    }
}

impl MetricsController {
    /// Get a reference to the global metrics controller.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics have not been initialized.
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Render metrics and write them to `path`.
    ///
    /// The file is written beside its final location and renamed into place,
    /// so a collector never reads a half-written file.
    pub fn write_textfile(&self, path: &Path) -> Result<(), MetricsError> {
        write_atomically(path, &self.render())?;
        debug!(path = %path.display(), "Wrote metrics textfile");
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), MetricsError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = std::path::PathBuf::from(temp);

    std::fs::write(&temp, contents).context(WriteTextfileSnafu { path })?;
    std::fs::rename(&temp, path).context(WriteTextfileSnafu { path })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::metrics::events::{RowsLoaded, RunCompleted, RunStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_textfile_contains_emitted_metrics() {
        init_test();
        emit!(RowsLoaded {
            count: 42,
            source: "textfile_test".to_string(),
        });
        emit!(RunCompleted {
            status: RunStatus::Loaded,
            duration: Duration::from_millis(120),
            source: "textfile_test".to_string(),
        });

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snowdrift.prom");
        MetricsController::get()
            .unwrap()
            .write_textfile(&path)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("snowdrift_rows_loaded_total"));
        assert!(contents.contains("textfile_test"));
        assert!(!dir.path().join("snowdrift.prom.tmp").exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let err = write_atomically(Path::new("/nonexistent/dir/x.prom"), "x").unwrap_err();
        assert!(matches!(err, MetricsError::WriteTextfile { .. }));
    }
}
