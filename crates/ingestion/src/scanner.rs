//! Resumable scan over a fixed block range.
//!
//! Blocks are processed strictly one after another. For each block the
//! results are appended to the sink before the progress file is advanced, so
//! `last_completed_block` always means every block up to it is recorded.
//! A crash between the two steps replays one block, and the sink drops
//! attacks it already holds.

use crate::block_processor::BlockProcessor;
use crate::error::{BlockError, FetchError, ScanError};
use crate::retry::{RetryMachine, RetryPolicy, RetryState};
use crate::rpc_client::BlockSource;
use sandwich_scan_db::models::SandwichAttack;
use sandwich_scan_db::{ProgressFile, ResultSink, ScanState};
use sandwich_scan_telemetry::{Metrics, ProgressReporter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, warn, Instrument};

/// Default block range: January 1st 2022 through December 31st 2024.
pub const DEFAULT_START_BLOCK: u64 = 13_916_166;
pub const DEFAULT_END_BLOCK: u64 = 21_525_419;

/// What to do when a block's swaps cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Halt the scan at the block.
    #[default]
    Abort,
    /// Refetch the block under the retry policy, then halt.
    RetryAsTransient,
}

/// Parameters of one scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub start_block: u64,
    pub end_block: u64,
    pub retry: RetryPolicy,
    pub decode_policy: DecodePolicy,
    /// Log a progress line every this many blocks.
    pub report_every: u64,
}

impl ScanConfig {
    /// Scan `[start_block, end_block]` inclusive with default policies.
    pub fn new(start_block: u64, end_block: u64) -> Result<Self, ScanError> {
        if start_block > end_block {
            return Err(ScanError::InvalidRange {
                start: start_block,
                end: end_block,
            });
        }

        Ok(Self {
            start_block,
            end_block,
            retry: RetryPolicy::default(),
            decode_policy: DecodePolicy::default(),
            report_every: 100,
        })
    }
}

/// Outcome of a scan that did not halt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// First block this run looked at.
    pub first_block: u64,
    pub last_completed_block: Option<u64>,
    pub blocks_scanned: u64,
    pub attacks_recorded: u64,
    pub cancelled: bool,
}

/// Drives fetch, detection and persistence across the block range.
pub struct Scanner<B: BlockSource> {
    source: B,
    processor: BlockProcessor,
    sink: Box<dyn ResultSink>,
    progress: ProgressFile,
    metrics: Metrics,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl<B: BlockSource> Scanner<B> {
    pub fn new(
        source: B,
        processor: BlockProcessor,
        sink: Box<dyn ResultSink>,
        progress: ProgressFile,
        metrics: Metrics,
        config: ScanConfig,
    ) -> Self {
        Self {
            source,
            processor,
            sink,
            progress,
            metrics,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the scan at the next block boundary when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn source(&self) -> &B {
        &self.source
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Scan from the persisted resume point to the end of the range.
    pub async fn run(&mut self) -> Result<ScanSummary, ScanError> {
        let mut state = self.progress.load();
        let first_block = state.resume_from(self.config.start_block);
        let mut reporter = ProgressReporter::new(
            self.config.start_block,
            self.config.end_block,
            state.last_completed_block,
        );

        let mut summary = ScanSummary {
            first_block,
            last_completed_block: state.last_completed_block,
            blocks_scanned: 0,
            attacks_recorded: 0,
            cancelled: false,
        };

        if first_block > self.config.end_block {
            info!(
                "Range {}..={} already complete",
                self.config.start_block, self.config.end_block
            );
            return Ok(summary);
        }

        info!(
            start_block = self.config.start_block,
            end_block = self.config.end_block,
            resume_block = first_block,
            remaining = self.config.end_block - first_block + 1,
            "Starting sandwich scan"
        );

        for block_number in first_block..=self.config.end_block {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let recorded = match self
                .scan_block(block_number, &mut state)
                .instrument(debug_span!("block", block_number))
                .await
            {
                Ok(Some(recorded)) => recorded,
                Ok(None) => {
                    summary.cancelled = true;
                    break;
                }
                Err(source) => {
                    if source.is_fetch_failure() {
                        self.metrics.inc_fetch_failures();
                    }
                    error!(
                        block_number,
                        error_class = source.class(),
                        "Scan halted: {}",
                        source
                    );
                    return Err(ScanError::Halted {
                        block: block_number,
                        source,
                    });
                }
            };

            summary.last_completed_block = state.last_completed_block;
            summary.blocks_scanned += 1;
            summary.attacks_recorded += recorded as u64;

            let snapshot = reporter.record_block(block_number, recorded);
            if summary.blocks_scanned % self.config.report_every.max(1) == 0
                || block_number == self.config.end_block
            {
                ProgressReporter::log(&snapshot);
            }
        }

        if summary.cancelled {
            info!(
                last_completed_block = summary.last_completed_block,
                "Scan interrupted, progress saved"
            );
        } else {
            info!(
                blocks_scanned = summary.blocks_scanned,
                sandwiches = summary.attacks_recorded,
                "Scan complete"
            );
        }
        Ok(summary)
    }

    /// Fetch, detect and persist one block. `Ok(None)` means the scan was
    /// cancelled before anything for the block was written.
    async fn scan_block(
        &mut self,
        block_number: u64,
        state: &mut ScanState,
    ) -> Result<Option<usize>, BlockError> {
        let Some(attacks) = self.fetch_and_detect(block_number).await? else {
            return Ok(None);
        };

        debug!(block_number, stage = "persisting", sandwiches = attacks.len());
        let recorded = self.sink.append(&attacks).await?;
        self.progress.save(block_number)?;
        state.last_completed_block = Some(block_number);

        self.metrics.inc_sandwiches_recorded(recorded as u64);
        self.metrics.block_completed(block_number);
        if recorded > 0 {
            info!(block_number, sandwiches = recorded, "Recorded sandwiches");
        }
        debug!(block_number, stage = "done");
        Ok(Some(recorded))
    }

    async fn fetch_and_detect(
        &self,
        block_number: u64,
    ) -> Result<Option<Vec<SandwichAttack>>, BlockError> {
        let mut retry = RetryMachine::new(&self.config.retry);
        let mut attacks = Vec::new();
        let mut last_error = None;

        loop {
            match retry.state() {
                RetryState::Fetching { attempt } => {
                    debug!(block_number, attempt, stage = "fetching");
                    let outcome = match self.source.fetch_block(block_number).await {
                        Ok(block) => self
                            .processor
                            .process_block(&block)
                            .map_err(FetchError::Decode),
                        Err(e) => Err(e),
                    };

                    match outcome {
                        Ok(found) => {
                            attacks = found;
                            retry.succeed();
                        }
                        Err(FetchError::Fatal(message)) => {
                            return Err(BlockError::FatalProvider(message))
                        }
                        Err(FetchError::Decode(e))
                            if self.config.decode_policy == DecodePolicy::Abort =>
                        {
                            return Err(BlockError::Decode(e))
                        }
                        Err(e) => {
                            warn!(block_number, attempt, "Block fetch failed: {}", e);
                            self.metrics.inc_fetch_retries();
                            last_error = Some(e);
                            retry.fail();
                        }
                    }
                }
                RetryState::RetryWait { attempt, delay } => {
                    debug!(
                        block_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        stage = "retry_wait"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {
                            retry.resume();
                        }
                    }
                }
                RetryState::Failed { attempts } => {
                    return Err(match last_error {
                        Some(FetchError::Decode(e)) => BlockError::Decode(e),
                        other => BlockError::TransientNetwork {
                            attempts,
                            message: other.map(|e| e.to_string()).unwrap_or_default(),
                        },
                    });
                }
                RetryState::Done { attempts } => {
                    if attempts > 1 {
                        info!(block_number, attempts, "Block fetched after retries");
                    }
                    return Ok(Some(attacks));
                }
            }
        }
    }
}
