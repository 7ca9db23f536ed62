//! Uniswap V2 swap log normalization.

use crate::error::DecodeError;
use crate::rpc_client::{RawBlock, RawLog, SWAP_TOPIC};
use alloy::primitives::{Address, B256, U256};
use sandwich_scan_db::models::{Direction, SwapEvent};
use std::collections::HashMap;

/// `amount0In, amount1In, amount0Out, amount1Out`, one word each.
const SWAP_DATA_LEN: usize = 4 * 32;

/// Turn a block's Uniswap V2 `Swap` logs into swap events ordered by log index.
///
/// The sender of each swap is the account that signed the enclosing
/// transaction. Logs with other topics are ignored. A swap whose direction
/// cannot be told apart, or that points at a transaction missing from the
/// block, fails the whole block.
pub fn normalize(block: &RawBlock) -> Result<Vec<SwapEvent>, DecodeError> {
    let senders: HashMap<B256, (u64, Address)> = block
        .transactions
        .iter()
        .map(|tx| (tx.hash, (tx.index, tx.from)))
        .collect();

    let mut events = block
        .logs
        .iter()
        .filter(|log| log.topics.first() == Some(&SWAP_TOPIC))
        .map(|log| decode_swap(block.number, log, &senders))
        .collect::<Result<Vec<_>, _>>()?;

    events.sort_by_key(|event| event.block_index);
    if let Some(pair) = events.windows(2).find(|pair| pair[0].block_index == pair[1].block_index) {
        return Err(DecodeError::new(
            block.number,
            format!("duplicate log index {}", pair[0].block_index),
        ));
    }

    Ok(events)
}

fn decode_swap(
    block_number: u64,
    log: &RawLog,
    senders: &HashMap<B256, (u64, Address)>,
) -> Result<SwapEvent, DecodeError> {
    let fail = |reason: String| {
        DecodeError::new(block_number, format!("log {}: {}", log.log_index, reason))
    };

    if log.removed {
        return Err(fail("log was removed by a reorg".to_string()));
    }
    if log.block_number != block_number {
        return Err(fail(format!("belongs to block {}", log.block_number)));
    }
    if log.data.len() != SWAP_DATA_LEN {
        return Err(fail(format!("expected {} data bytes, got {}", SWAP_DATA_LEN, log.data.len())));
    }

    let word = |i: usize| U256::from_be_slice(&log.data[i * 32..(i + 1) * 32]);
    let (amount0_in, amount1_in, amount0_out, amount1_out) = (word(0), word(1), word(2), word(3));

    let (direction, amount_in, amount_out) = match (amount0_in.is_zero(), amount1_in.is_zero()) {
        (false, true) => (Direction::Buy, amount0_in, amount1_out),
        (true, false) => (Direction::Sell, amount1_in, amount0_out),
        (false, false) => return Err(fail("both token inputs are non-zero".to_string())),
        (true, true) => return Err(fail("no token input".to_string())),
    };

    let (tx_index, sender) = senders
        .get(&log.tx_hash)
        .copied()
        .ok_or_else(|| fail(format!("transaction {:#x} not in block", log.tx_hash)))?;
    if tx_index != log.tx_index {
        return Err(fail(format!(
            "transaction index {} does not match block position {}",
            log.tx_index, tx_index
        )));
    }

    Ok(SwapEvent {
        tx_hash: log.tx_hash,
        block_number,
        tx_index,
        block_index: log.log_index,
        sender,
        pair_id: log.address,
        direction,
        amount_in,
        amount_out,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rpc_client::RawTransaction;

    pub(crate) fn swap_data(
        amount0_in: u64,
        amount1_in: u64,
        amount0_out: u64,
        amount1_out: u64,
    ) -> Vec<u8> {
        [amount0_in, amount1_in, amount0_out, amount1_out]
            .iter()
            .flat_map(|amount| U256::from(*amount).to_be_bytes::<32>())
            .collect()
    }

    pub(crate) fn swap_log(
        block_number: u64,
        tx: u8,
        log_index: u64,
        pair: u8,
        data: Vec<u8>,
    ) -> RawLog {
        RawLog {
            address: Address::repeat_byte(pair),
            topics: vec![SWAP_TOPIC, B256::ZERO, B256::ZERO],
            data,
            block_number,
            tx_hash: B256::repeat_byte(tx),
            tx_index: tx as u64,
            log_index,
            removed: false,
        }
    }

    pub(crate) fn transaction(tx: u8, from: u8) -> RawTransaction {
        RawTransaction {
            hash: B256::repeat_byte(tx),
            index: tx as u64,
            from: Address::repeat_byte(from),
        }
    }

    fn block(logs: Vec<RawLog>) -> RawBlock {
        RawBlock {
            number: 100,
            timestamp: 1_640_995_200,
            transactions: vec![transaction(1, 0x0a), transaction(2, 0x11), transaction(3, 0x0a)],
            logs,
        }
    }

    fn decode_one(log: RawLog) -> Result<Vec<SwapEvent>, DecodeError> {
        normalize(&block(vec![log]))
    }

    #[test]
    fn test_directions_and_amounts() {
        let events = normalize(&block(vec![
            swap_log(100, 1, 4, 0xaa, swap_data(10, 0, 0, 100)),
            swap_log(100, 3, 9, 0xaa, swap_data(0, 100, 12, 0)),
        ]))
        .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].direction, Direction::Buy);
        assert_eq!(events[0].amount_in, U256::from(10u64));
        assert_eq!(events[0].amount_out, U256::from(100u64));
        assert_eq!(events[1].direction, Direction::Sell);
        assert_eq!(events[1].amount_in, U256::from(100u64));
        assert_eq!(events[1].amount_out, U256::from(12u64));
        assert_eq!(events[1].block_index, 9);
        assert_eq!(events[1].tx_index, 3);
    }

    #[test]
    fn test_sender_is_transaction_signer() {
        let events = decode_one(swap_log(100, 2, 5, 0xaa, swap_data(5, 0, 0, 40))).unwrap();
        assert_eq!(events[0].sender, Address::repeat_byte(0x11));
        assert_eq!(events[0].pair_id, Address::repeat_byte(0xaa));
    }

    #[test]
    fn test_events_sorted_by_log_index() {
        let events = normalize(&block(vec![
            swap_log(100, 3, 9, 0xaa, swap_data(0, 100, 12, 0)),
            swap_log(100, 1, 4, 0xaa, swap_data(10, 0, 0, 100)),
        ]))
        .unwrap();
        let order: Vec<u64> = events.iter().map(|e| e.block_index).collect();
        assert_eq!(order, vec![4, 9]);
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let mut transfer = swap_log(100, 1, 2, 0xaa, vec![0; 32]);
        transfer.topics[0] = B256::repeat_byte(0xdd);
        assert!(normalize(&block(vec![transfer])).unwrap().is_empty());
    }

    #[test]
    fn test_ambiguous_direction_is_rejected() {
        let err = decode_one(swap_log(100, 1, 4, 0xaa, swap_data(10, 3, 0, 100))).unwrap_err();
        assert_eq!(err.block_number, 100);

        assert!(decode_one(swap_log(100, 1, 4, 0xaa, swap_data(0, 0, 0, 100))).is_err());
    }

    #[test]
    fn test_malformed_logs_are_rejected() {
        assert!(decode_one(swap_log(100, 1, 4, 0xaa, vec![0; 96])).is_err());
        assert!(decode_one(swap_log(100, 7, 4, 0xaa, swap_data(10, 0, 0, 100))).is_err());
        assert!(decode_one(swap_log(101, 1, 4, 0xaa, swap_data(10, 0, 0, 100))).is_err());

        let mut removed = swap_log(100, 1, 4, 0xaa, swap_data(10, 0, 0, 100));
        removed.removed = true;
        assert!(decode_one(removed).is_err());
    }
}
