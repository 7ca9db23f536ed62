//! Sandwich pattern matching over one block's swaps.

use alloy::primitives::Address;
use sandwich_scan_db::models::{Direction, SwapEvent};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A frontrun / victims / backrun triple before revenue is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandwichCandidate {
    pub frontrun: SwapEvent,
    pub victims: Vec<SwapEvent>,
    pub backrun: SwapEvent,
}

impl SandwichCandidate {
    pub fn attacker(&self) -> Address {
        self.frontrun.sender
    }

    pub fn pair_id(&self) -> Address {
        self.frontrun.pair_id
    }
}

/// Find sandwich attacks among the swaps of a single block.
///
/// A sandwich is a swap by the attacker, one or more same-direction swaps by
/// other senders, then an opposite swap by the attacker whose input exactly
/// equals the first swap's output. Each swap belongs to at most one result.
///
/// # Arguments
/// * `events` - All normalized swaps of the block, in any order
///
/// # Returns
/// Detected candidates ordered by frontrun position
pub fn detect_sandwiches(events: &[SwapEvent]) -> Vec<SandwichCandidate> {
    let mut by_pair: BTreeMap<Address, Vec<&SwapEvent>> = BTreeMap::new();
    for event in events {
        by_pair.entry(event.pair_id).or_default().push(event);
    }

    let mut found = Vec::new();
    for (_, mut swaps) in by_pair {
        if swaps.len() < 3 {
            continue;
        }
        swaps.sort_by_key(|swap| swap.block_index);
        found.extend(match_pair(&swaps));
    }

    found.sort_by_key(|candidate| candidate.frontrun.block_index);
    found
}

/// Match triples within one pair's swaps, sorted by `block_index`.
fn match_pair(swaps: &[&SwapEvent]) -> Vec<SandwichCandidate> {
    let two_sided = two_sided_senders(swaps);
    let mut consumed = vec![false; swaps.len()];
    let mut found = Vec::new();

    for i in 0..swaps.len() {
        let frontrun = swaps[i];
        if consumed[i] || !two_sided.contains(&frontrun.sender) {
            continue;
        }

        let Some(k) = find_closure(swaps, &consumed, i) else {
            continue;
        };

        let victims: Vec<usize> = (i + 1..k)
            .filter(|&j| {
                !consumed[j]
                    && swaps[j].direction == frontrun.direction
                    && swaps[j].sender != frontrun.sender
            })
            .collect();

        // Nobody traded into the attacker's price impact.
        if victims.is_empty() {
            continue;
        }

        consumed[i] = true;
        consumed[k] = true;
        for &j in &victims {
            consumed[j] = true;
        }

        found.push(SandwichCandidate {
            frontrun: frontrun.clone(),
            victims: victims.iter().map(|&j| swaps[j].clone()).collect(),
            backrun: swaps[k].clone(),
        });
    }

    found
}

/// Senders with swaps in both directions on the pair. Only they can open a
/// sandwich.
fn two_sided_senders(swaps: &[&SwapEvent]) -> HashSet<Address> {
    let mut sides: HashMap<Address, (bool, bool)> = HashMap::new();
    for swap in swaps {
        let entry = sides.entry(swap.sender).or_default();
        match swap.direction {
            Direction::Buy => entry.0 = true,
            Direction::Sell => entry.1 = true,
        }
    }

    sides
        .into_iter()
        .filter(|(_, (buys, sells))| *buys && *sells)
        .map(|(sender, _)| sender)
        .collect()
}

/// Earliest unconsumed swap after `i` that closes the position opened at `i`.
fn find_closure(swaps: &[&SwapEvent], consumed: &[bool], i: usize) -> Option<usize> {
    let frontrun = swaps[i];
    (i + 1..swaps.len()).find(|&k| {
        let candidate = swaps[k];
        !consumed[k]
            && candidate.sender == frontrun.sender
            && candidate.direction != frontrun.direction
            && candidate.amount_in == frontrun.amount_out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};

    const A: u8 = 0x0a;
    const B: u8 = 0x0b;
    const V: u8 = 0x11;
    const W: u8 = 0x12;
    const PAIR: u8 = 0xaa;
    const OTHER_PAIR: u8 = 0xbb;

    fn swap(
        pair: u8,
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
            pair_id: Address::repeat_byte(pair),
            direction,
            amount_in: U256::from(amount_in),
            amount_out: U256::from(amount_out),
        }
    }

    fn assert_well_formed(candidates: &[SandwichCandidate]) {
        let mut members = HashSet::new();
        for c in candidates {
            assert_eq!(c.frontrun.sender, c.backrun.sender);
            assert_ne!(c.frontrun.direction, c.backrun.direction);
            assert_eq!(c.backrun.amount_in, c.frontrun.amount_out);
            assert!(!c.victims.is_empty());
            for v in &c.victims {
                assert!(c.frontrun.block_index < v.block_index);
                assert!(v.block_index < c.backrun.block_index);
                assert_eq!(v.direction, c.frontrun.direction);
                assert_ne!(v.sender, c.attacker());
                assert_eq!(v.pair_id, c.pair_id());
            }
            for e in std::iter::once(&c.frontrun)
                .chain(&c.victims)
                .chain(std::iter::once(&c.backrun))
            {
                assert!(members.insert(e.block_index), "swap {} used twice", e.block_index);
            }
        }
    }

    #[test]
    fn test_basic_sandwich() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attacker(), Address::repeat_byte(A));
        assert_eq!(found[0].victims, vec![events[1].clone()]);
        assert_eq!(found[0].backrun, events[2]);
        assert_well_formed(&found);
    }

    #[test]
    fn test_no_victim_no_sandwich() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
        ];
        assert!(detect_sandwiches(&events).is_empty());
    }

    #[test]
    fn test_closure_requires_exact_amount() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 90, 12),
        ];
        assert!(detect_sandwiches(&events).is_empty());

        let off_by_one = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 99, 12),
        ];
        assert!(detect_sandwiches(&off_by_one).is_empty());
    }

    #[test]
    fn test_no_opposite_direction_pair() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Buy, 100, 12),
            swap(PAIR, W, 4, Direction::Sell, 40, 5),
        ];
        assert!(detect_sandwiches(&events).is_empty());
    }

    #[test]
    fn test_opposite_direction_trades_are_not_victims() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Sell, 40, 5),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
        ];
        assert!(detect_sandwiches(&events).is_empty());
    }

    #[test]
    fn test_attacker_swaps_in_between_are_not_victims() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, A, 2, Direction::Buy, 7, 50),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
        ];
        assert!(detect_sandwiches(&events).is_empty());

        let with_victim = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, A, 2, Direction::Buy, 7, 50),
            swap(PAIR, V, 3, Direction::Buy, 5, 40),
            swap(PAIR, A, 4, Direction::Sell, 100, 12),
        ];
        let found = detect_sandwiches(&with_victim);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].victims.len(), 1);
        assert_eq!(found[0].victims[0].sender, Address::repeat_byte(V));
    }

    #[test]
    fn test_multiple_victims_in_order() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Sell, 1_000, 3),
            swap(PAIR, V, 2, Direction::Sell, 500, 1),
            swap(PAIR, W, 3, Direction::Buy, 2, 600),
            swap(PAIR, W, 4, Direction::Sell, 400, 1),
            swap(PAIR, A, 5, Direction::Buy, 3, 1_100),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 1);
        let victim_indexes: Vec<u64> = found[0].victims.iter().map(|v| v.block_index).collect();
        assert_eq!(victim_indexes, vec![2, 4]);
        assert_well_formed(&found);
    }

    #[test]
    fn test_earliest_closure_wins() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
            swap(PAIR, W, 4, Direction::Buy, 5, 30),
            swap(PAIR, A, 5, Direction::Sell, 100, 11),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].backrun.block_index, 3);
        assert_eq!(found[0].victims.len(), 1);
    }

    #[test]
    fn test_nested_sandwiches_do_not_share_swaps() {
        // B wraps V inside A's sandwich; V may only be counted once.
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, B, 2, Direction::Buy, 20, 180),
            swap(PAIR, V, 3, Direction::Buy, 5, 40),
            swap(PAIR, B, 4, Direction::Sell, 180, 23),
            swap(PAIR, A, 5, Direction::Sell, 100, 12),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attacker(), Address::repeat_byte(A));
        let victim_senders: Vec<Address> = found[0].victims.iter().map(|v| v.sender).collect();
        assert_eq!(victim_senders, vec![Address::repeat_byte(B), Address::repeat_byte(V)]);
        assert_well_formed(&found);
    }

    #[test]
    fn test_consecutive_sandwiches_by_same_attacker() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
            swap(PAIR, A, 4, Direction::Buy, 20, 150),
            swap(PAIR, W, 5, Direction::Buy, 5, 30),
            swap(PAIR, A, 6, Direction::Sell, 150, 22),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].frontrun.block_index, 1);
        assert_eq!(found[1].frontrun.block_index, 4);
        assert_well_formed(&found);
    }

    #[test]
    fn test_pairs_are_independent() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(OTHER_PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
        ];
        assert!(detect_sandwiches(&events).is_empty());

        let interleaved = vec![
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(OTHER_PAIR, B, 2, Direction::Sell, 70, 8),
            swap(PAIR, V, 3, Direction::Buy, 5, 40),
            swap(OTHER_PAIR, W, 4, Direction::Sell, 20, 2),
            swap(PAIR, A, 5, Direction::Sell, 100, 12),
            swap(OTHER_PAIR, B, 6, Direction::Buy, 8, 71),
        ];
        let found = detect_sandwiches(&interleaved);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].pair_id(), Address::repeat_byte(PAIR));
        assert_eq!(found[1].pair_id(), Address::repeat_byte(OTHER_PAIR));
        assert_well_formed(&found);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let events = vec![
            swap(PAIR, A, 3, Direction::Sell, 100, 12),
            swap(PAIR, A, 1, Direction::Buy, 10, 100),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
        ];

        let found = detect_sandwiches(&events);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].frontrun.block_index, 1);
    }

    #[test]
    fn test_backrun_before_frontrun_is_not_a_closure() {
        let events = vec![
            swap(PAIR, A, 1, Direction::Sell, 100, 12),
            swap(PAIR, V, 2, Direction::Buy, 5, 40),
            swap(PAIR, A, 3, Direction::Buy, 10, 100),
        ];
        assert!(detect_sandwiches(&events).is_empty());
    }
}
