//! Per-block pipeline: normalize swaps, match sandwiches, attach revenue.

use crate::error::DecodeError;
use crate::normalizer::normalize;
use crate::rpc_client::RawBlock;
use sandwich_scan_db::models::{hex_address, hex_hash, SandwichAttack};
use sandwich_scan_heuristics::BlockAnalyzer;
use sandwich_scan_telemetry::{AuditLog, Metrics};
use serde::Serialize;
use tracing::{debug, warn};

/// Block processor turning fetched blocks into attack records.
pub struct BlockProcessor {
    analyzer: BlockAnalyzer,
    metrics: Metrics,
    audit: Option<AuditLog>,
}

#[derive(Debug, Serialize)]
struct AuditSandwich {
    block_number: u64,
    pair_address: String,
    attacker_address: String,
    frontrun_tx: String,
    victim_txs: Vec<String>,
    backrun_tx: String,
    revenue_raw: String,
    revenue_eth: String,
    unprofitable: bool,
}

impl From<&SandwichAttack> for AuditSandwich {
    fn from(attack: &SandwichAttack) -> Self {
        Self {
            block_number: attack.block_number,
            pair_address: hex_address(&attack.pair_id),
            attacker_address: hex_address(&attack.attacker),
            frontrun_tx: hex_hash(&attack.frontrun.tx_hash),
            victim_txs: attack.victims.iter().map(|v| hex_hash(&v.tx_hash)).collect(),
            backrun_tx: hex_hash(&attack.backrun.tx_hash),
            revenue_raw: attack.revenue_raw.to_string(),
            revenue_eth: attack.revenue_eth.to_string(),
            unprofitable: attack.unprofitable,
        }
    }
}

impl BlockProcessor {
    /// Create a new block processor.
    ///
    /// # Arguments
    /// * `analyzer` - Sandwich matcher and revenue calculator
    /// * `metrics` - Metrics collector
    /// * `audit` - Optional JSON-lines sample of every detected attack
    pub fn new(analyzer: BlockAnalyzer, metrics: Metrics, audit: Option<AuditLog>) -> Self {
        Self {
            analyzer,
            metrics,
            audit,
        }
    }

    /// Detect the sandwiches of one fetched block.
    pub fn process_block(&self, block: &RawBlock) -> Result<Vec<SandwichAttack>, DecodeError> {
        debug!(block_number = block.number, stage = "normalizing");
        let events = normalize(block)?;
        self.metrics.inc_swaps_normalized(events.len() as u64);

        debug!(block_number = block.number, stage = "matching", swaps = events.len());
        let attacks = self.analyzer.analyze(block.number, block.timestamp, &events);
        self.metrics.inc_sandwiches_detected(attacks.len() as u64);

        if let Some(audit) = &self.audit {
            for attack in &attacks {
                if let Err(e) = audit.append(&AuditSandwich::from(attack)) {
                    warn!("Failed to write audit sample: {}", e);
                }
            }
        }

        Ok(attacks)
    }
}
