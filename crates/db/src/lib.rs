//! Storage layer for sandwich scan results.
//!
//! Holds the shared data model, the append-only result sinks (CSV and
//! SQLite) and the resumable progress file.

pub mod error;
pub mod models;
pub mod pool;
pub mod progress;
pub mod sink;

pub use error::PersistenceError;
pub use pool::{DbPool, SqliteSink};
pub use progress::{ProgressFile, ScanState};
pub use sink::{CsvSink, ResultSink};
