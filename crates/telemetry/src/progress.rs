//! Throughput and ETA reporting for long block-range scans.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

/// Weight of the newest sample in the blocks-per-second moving average.
const RATE_SMOOTHING: f64 = 0.1;

/// Point-in-time view of scan progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub current_block: u64,
    pub blocks_done: u64,
    pub total_blocks: u64,
    pub percent_complete: f64,
    pub attacks_total: u64,
    pub blocks_per_sec: f64,
    pub eta: Option<Duration>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6.2}%] block {} | {:.2} blocks/s | ETA {} | sandwiches {}",
            self.percent_complete,
            self.current_block,
            self.blocks_per_sec,
            self.eta.map(format_duration).unwrap_or_else(|| "calculating".to_string()),
            self.attacks_total
        )
    }
}

/// Tracks completed blocks over an inclusive range and estimates time left.
#[derive(Debug)]
pub struct ProgressReporter {
    range_start: u64,
    total_blocks: u64,
    blocks_done: u64,
    attacks_total: u64,
    rate: Option<f64>,
    last_tick: Instant,
}

impl ProgressReporter {
    /// # Arguments
    /// * `range_start` / `range_end` - Inclusive scan range
    /// * `last_completed_block` - Resume point, if any
    pub fn new(range_start: u64, range_end: u64, last_completed_block: Option<u64>) -> Self {
        Self::new_at(range_start, range_end, last_completed_block, Instant::now())
    }

    fn new_at(
        range_start: u64,
        range_end: u64,
        last_completed_block: Option<u64>,
        now: Instant,
    ) -> Self {
        let total_blocks = range_end.saturating_sub(range_start) + 1;
        let blocks_done = last_completed_block
            .filter(|block| *block >= range_start)
            .map(|block| (block - range_start + 1).min(total_blocks))
            .unwrap_or(0);

        Self {
            range_start,
            total_blocks,
            blocks_done,
            attacks_total: 0,
            rate: None,
            last_tick: now,
        }
    }

    /// Record a completed block and the number of attacks recorded for it.
    pub fn record_block(&mut self, block_number: u64, attacks: usize) -> ProgressSnapshot {
        self.record_block_at(block_number, attacks, Instant::now())
    }

    fn record_block_at(
        &mut self,
        block_number: u64,
        attacks: usize,
        now: Instant,
    ) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;

        if elapsed > 0.0 {
            let sample = 1.0 / elapsed;
            self.rate = Some(match self.rate {
                Some(rate) => rate + RATE_SMOOTHING * (sample - rate),
                None => sample,
            });
        }

        self.blocks_done =
            (block_number.saturating_sub(self.range_start) + 1).min(self.total_blocks);
        self.attacks_total += attacks as u64;
        self.snapshot(block_number)
    }

    fn snapshot(&self, current_block: u64) -> ProgressSnapshot {
        let remaining = self.total_blocks - self.blocks_done;
        let blocks_per_sec = self.rate.unwrap_or(0.0);
        let eta = if remaining == 0 {
            Some(Duration::ZERO)
        } else if blocks_per_sec > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / blocks_per_sec))
        } else {
            None
        };

        ProgressSnapshot {
            current_block,
            blocks_done: self.blocks_done,
            total_blocks: self.total_blocks,
            percent_complete: self.blocks_done as f64 * 100.0 / self.total_blocks as f64,
            attacks_total: self.attacks_total,
            blocks_per_sec,
            eta,
        }
    }

    /// Log a snapshot at info level.
    pub fn log(snapshot: &ProgressSnapshot) {
        info!(
            current_block = snapshot.current_block,
            blocks_done = snapshot.blocks_done,
            total_blocks = snapshot.total_blocks,
            percent_complete = snapshot.percent_complete,
            blocks_per_sec = snapshot.blocks_per_sec,
            eta_secs = snapshot.eta.map(|eta| eta.as_secs()),
            sandwiches = snapshot.attacks_total,
            "{}",
            snapshot
        );
    }
}

/// `1h 02m 03s` style rendering.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
