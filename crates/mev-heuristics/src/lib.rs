//! Sandwich attack heuristics over normalized Uniswap V2 swaps.

pub mod analyzer;
pub mod detectors;
pub mod revenue;

pub use analyzer::BlockAnalyzer;
pub use detectors::{detect_sandwiches, SandwichCandidate};
pub use revenue::{Revenue, RevenueCalculator};
