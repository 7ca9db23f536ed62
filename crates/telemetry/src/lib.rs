//! Observability for the sandwich scanner: logging, metrics, progress
//! reporting and audit samples.

pub mod audit;
pub mod logging;
pub mod metrics;
pub mod progress;

pub use audit::AuditLog;
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
pub use progress::{ProgressReporter, ProgressSnapshot};
