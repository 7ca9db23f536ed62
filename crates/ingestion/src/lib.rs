//! Block ingestion for the sandwich scanner: RPC fetch, swap normalization,
//! per-block detection and the resumable scan loop.

pub mod block_processor;
pub mod error;
pub mod normalizer;
pub mod retry;
pub mod rpc_client;
pub mod scanner;

pub use block_processor::BlockProcessor;
pub use error::{BlockError, DecodeError, FetchError, ScanError};
pub use retry::{RetryMachine, RetryPolicy, RetryState};
pub use rpc_client::{BlockSource, RawBlock, RawLog, RawTransaction, RpcClient, SWAP_TOPIC};
pub use scanner::{DecodePolicy, ScanConfig, ScanSummary, Scanner};
