//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `exporter`: Prometheus recorder and textfile export

pub mod events;
pub mod exporter;

pub use exporter::{MetricsController, init_global, init_test};

/// Macro for emitting metric events.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use snowdrift_core::metrics::events::RowsLoaded;
///
/// emit!(RowsLoaded { count: 100, source: "car_sales_data".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
