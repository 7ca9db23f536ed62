//! Block analyzer turning matched triples into attack records.

use crate::detectors::{detect_sandwiches, SandwichCandidate};
use crate::revenue::RevenueCalculator;
use sandwich_scan_db::models::{SandwichAttack, SwapEvent};
use tracing::debug;

/// Analyzer for detecting sandwich attacks in one block.
#[derive(Debug, Clone, Default)]
pub struct BlockAnalyzer {
    revenue: RevenueCalculator,
}

impl BlockAnalyzer {
    pub fn new(revenue: RevenueCalculator) -> Self {
        Self { revenue }
    }

    /// Detect sandwiches among a block's swaps and attach revenue.
    ///
    /// # Arguments
    /// * `block_number` - Number of the block the swaps belong to
    /// * `timestamp` - Block timestamp in unix seconds
    /// * `events` - Normalized swaps of the block
    pub fn analyze(
        &self,
        block_number: u64,
        timestamp: u64,
        events: &[SwapEvent],
    ) -> Vec<SandwichAttack> {
        detect_sandwiches(events)
            .into_iter()
            .map(|candidate| self.enrich(block_number, timestamp, candidate))
            .collect()
    }

    fn enrich(
        &self,
        block_number: u64,
        timestamp: u64,
        candidate: SandwichCandidate,
    ) -> SandwichAttack {
        let revenue = self
            .revenue
            .revenue(candidate.frontrun.amount_in, candidate.backrun.amount_out);

        debug!(
            block_number,
            attacker = %candidate.attacker(),
            victims = candidate.victims.len(),
            revenue_raw = %revenue.raw,
            "Matched sandwich"
        );

        SandwichAttack {
            block_number,
            timestamp,
            pair_id: candidate.pair_id(),
            attacker: candidate.attacker(),
            frontrun: candidate.frontrun,
            victims: candidate.victims,
            backrun: candidate.backrun,
            revenue_raw: revenue.raw,
            revenue_eth: revenue.display,
            unprofitable: revenue.unprofitable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use sandwich_scan_db::models::Direction;

    fn swap(
        sender: u8,
        index: u64,
        direction: Direction,
        amount_in: u64,
        amount_out: u64,
    ) -> SwapEvent {
        SwapEvent {
            tx_hash: B256::with_last_byte(index as u8),
            block_number: 100,
            tx_index: index,
            block_index: index,
            sender: Address::repeat_byte(sender),
            pair_id: Address::repeat_byte(0xaa),
            direction,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
        }
    }

    #[test]
    fn test_attack_record_carries_revenue() {
        let events = vec![
            swap(0x0a, 1, Direction::Buy, 10, 100),
            swap(0x11, 2, Direction::Buy, 5, 40),
            swap(0x0a, 3, Direction::Sell, 100, 12),
        ];

        let attacks = BlockAnalyzer::default().analyze(100, 1_640_995_200, &events);
        assert_eq!(attacks.len(), 1);

        let attack = &attacks[0];
        assert_eq!(attack.block_number, 100);
        assert_eq!(attack.attacker, Address::repeat_byte(0x0a));
        assert_eq!(attack.pair_id, Address::repeat_byte(0xaa));
        assert_eq!(attack.num_victims(), 1);
        assert_eq!(attack.revenue_raw, U256::from(2u64));
        assert!(!attack.unprofitable);
        assert_eq!(attack.key().frontrun_tx, B256::with_last_byte(1));
        assert_eq!(attack.key().backrun_tx, B256::with_last_byte(3));
    }

    #[test]
    fn test_losing_sandwich_is_still_recorded() {
        let events = vec![
            swap(0x0a, 1, Direction::Buy, 10, 100),
            swap(0x11, 2, Direction::Buy, 5, 40),
            swap(0x0a, 3, Direction::Sell, 100, 9),
        ];

        let attacks = BlockAnalyzer::default().analyze(100, 0, &events);
        assert_eq!(attacks.len(), 1);
        assert_eq!(attacks[0].revenue_raw, U256::ZERO);
        assert!(attacks[0].unprofitable);
    }
}
