//! Error taxonomy for fetching, decoding and scanning blocks.

use sandwich_scan_db::PersistenceError;

/// A block's swaps could not be decoded unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("block {block_number}: {reason}")]
pub struct DecodeError {
    pub block_number: u64,
    pub reason: String,
}

impl DecodeError {
    pub fn new(block_number: u64, reason: impl Into<String>) -> Self {
        Self {
            block_number,
            reason: reason.into(),
        }
    }
}

/// Failure of the fetch boundary.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection reset, timeout, rate limit. Worth retrying.
    #[error("transient network error: {0}")]
    Transient(String),
    /// The provider rejected the request in a way retrying will not fix.
    #[error("fatal provider error: {0}")]
    Fatal(String),
    /// The provider answered but the payload could not be understood.
    #[error("malformed provider response: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Why a block could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("gave up after {attempts} attempts: {message}")]
    TransientNetwork { attempts: u32, message: String },
    #[error("{0}")]
    FatalProvider(String),
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Persistence(#[from] PersistenceError),
}

impl BlockError {
    /// Error class reported to the operator.
    pub fn class(&self) -> &'static str {
        match self {
            BlockError::TransientNetwork { .. } => "TransientNetworkError",
            BlockError::FatalProvider(_) => "FatalProviderError",
            BlockError::Decode(_) => "DecodeError",
            BlockError::Persistence(_) => "PersistenceError",
        }
    }

    /// The provider could not deliver the block.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, BlockError::TransientNetwork { .. } | BlockError::FatalProvider(_))
    }
}

/// Failure of a whole scan run.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid block range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("scan halted at block {block} ({}): {source}", .source.class())]
    Halted {
        block: u64,
        #[source]
        source: BlockError,
    },
}
