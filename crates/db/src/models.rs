//! Data model shared by the matcher, the sinks and the scanner.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Swap direction relative to the pair's canonical token ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// token0 in, token1 out.
    Buy,
    /// token1 in, token0 out.
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

/// One Uniswap V2 swap observed in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    /// Position of the transaction in the block.
    pub tx_index: u64,
    /// Position of the swap log in the block. Unique per block and strictly
    /// increasing in execution order.
    pub block_index: u64,
    /// Externally-owned account that signed the transaction.
    pub sender: Address,
    pub pair_id: Address,
    pub direction: Direction,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Identity of a recorded attack. Sinks use it to make appends idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttackKey {
    pub frontrun_tx: B256,
    pub backrun_tx: B256,
}

/// A detected frontrun / victims / backrun triple with its realized revenue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandwichAttack {
    pub block_number: u64,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    pub pair_id: Address,
    pub attacker: Address,
    pub frontrun: SwapEvent,
    pub victims: Vec<SwapEvent>,
    pub backrun: SwapEvent,
    /// Profit in the smallest unit of the frontrun's input token.
    pub revenue_raw: U256,
    /// `revenue_raw` scaled for display. Never used for comparisons.
    pub revenue_eth: Decimal,
    /// Set when the backrun returned no more than the frontrun spent.
    pub unprofitable: bool,
}

impl SandwichAttack {
    pub fn num_victims(&self) -> usize {
        self.victims.len()
    }

    pub fn key(&self) -> AttackKey {
        AttackKey {
            frontrun_tx: self.frontrun.tx_hash,
            backrun_tx: self.backrun.tx_hash,
        }
    }

    pub fn datetime_utc(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Lowercase `0x`-prefixed hex, the form used in every output column.
pub fn hex_address(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn hex_hash(hash: &B256) -> String {
    format!("{:#x}", hash)
}
