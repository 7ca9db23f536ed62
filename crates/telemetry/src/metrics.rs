//! Prometheus metrics for the sandwich scanner.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Metrics collector for one scan.
///
/// Each instance owns its registry, so several collectors can coexist in
/// one process.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    blocks_scanned: IntCounter,
    swaps_normalized: IntCounter,
    sandwiches_detected: IntCounter,
    sandwiches_recorded: IntCounter,
    fetch_retries: IntCounter,
    fetch_failures: IntCounter,
    last_completed_block: IntGauge,
    rpc_latency: HistogramVec,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let blocks_scanned = IntCounter::new(
            "sandwich_scan_blocks_scanned_total",
            "Total number of blocks fully scanned and persisted",
        )?;
        let swaps_normalized = IntCounter::new(
            "sandwich_scan_swaps_normalized_total",
            "Total number of Uniswap V2 swaps decoded",
        )?;
        let sandwiches_detected = IntCounter::new(
            "sandwich_scan_sandwiches_detected_total",
            "Total number of sandwich attacks matched",
        )?;
        let sandwiches_recorded = IntCounter::new(
            "sandwich_scan_sandwiches_recorded_total",
            "Total number of sandwich attacks newly written to the result sink",
        )?;
        let fetch_retries = IntCounter::new(
            "sandwich_scan_fetch_retries_total",
            "Total number of retried block fetches",
        )?;
        let fetch_failures = IntCounter::new(
            "sandwich_scan_fetch_failures_total",
            "Total number of blocks whose fetch failed for good, halting the scan",
        )?;
        let last_completed_block = IntGauge::with_opts(Opts::new(
            "sandwich_scan_last_completed_block",
            "Highest block whose results and progress are persisted",
        ))?;
        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("sandwich_scan_rpc_latency_seconds", "RPC call latency in seconds"),
            &["method"],
        )?;

        registry.register(Box::new(blocks_scanned.clone()))?;
        registry.register(Box::new(swaps_normalized.clone()))?;
        registry.register(Box::new(sandwiches_detected.clone()))?;
        registry.register(Box::new(sandwiches_recorded.clone()))?;
        registry.register(Box::new(fetch_retries.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(last_completed_block.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            blocks_scanned,
            swaps_normalized,
            sandwiches_detected,
            sandwiches_recorded,
            fetch_retries,
            fetch_failures,
            last_completed_block,
            rpc_latency,
        })
    }

    /// Record a block whose results and progress were persisted.
    pub fn block_completed(&self, block_number: u64) {
        self.blocks_scanned.inc();
        self.last_completed_block.set(block_number as i64);
    }

    pub fn inc_swaps_normalized(&self, count: u64) {
        self.swaps_normalized.inc_by(count);
    }

    pub fn inc_sandwiches_detected(&self, count: u64) {
        self.sandwiches_detected.inc_by(count);
    }

    pub fn inc_sandwiches_recorded(&self, count: u64) {
        self.sandwiches_recorded.inc_by(count);
    }

    pub fn inc_fetch_retries(&self) {
        self.fetch_retries.inc();
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.inc();
    }

    /// Record RPC latency.
    pub fn observe_rpc_latency(&self, method: &str, duration_secs: f64) {
        self.rpc_latency.with_label_values(&[method]).observe(duration_secs);
    }

    pub fn blocks_scanned(&self) -> u64 {
        self.blocks_scanned.get()
    }

    pub fn fetch_retries(&self) -> u64 {
        self.fetch_retries.get()
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.get()
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
