//! Attacker revenue in exact integer arithmetic.

use alloy::primitives::U256;
use rust_decimal::Decimal;

/// Largest scale a [`Decimal`] can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Largest power of ten that fits in a [`U256`].
const MAX_UNIT_DECIMALS: u32 = 77;

/// Realized profit of one sandwich.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revenue {
    /// Profit in the token's smallest unit, clamped at zero.
    pub raw: U256,
    /// `raw` divided by the unit scale, rounded for display.
    pub display: Decimal,
    /// The backrun returned no more than the frontrun spent.
    pub unprofitable: bool,
}

/// Computes revenue as `backrun.amount_out - frontrun.amount_in`.
///
/// Gas and fees paid by the attacker are not subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenueCalculator {
    unit_decimals: u32,
    display_precision: u32,
}

impl Default for RevenueCalculator {
    fn default() -> Self {
        Self::new(18, 6)
    }
}

impl RevenueCalculator {
    /// # Arguments
    /// * `unit_decimals` - Decimals of the revenue token (18 for WETH), at most 77
    /// * `display_precision` - Fractional digits kept in the display value
    pub fn new(unit_decimals: u32, display_precision: u32) -> Self {
        Self {
            unit_decimals: unit_decimals.min(MAX_UNIT_DECIMALS),
            display_precision: display_precision.min(MAX_DECIMAL_SCALE),
        }
    }

    pub fn display_precision(&self) -> u32 {
        self.display_precision
    }

    pub fn revenue(&self, frontrun_amount_in: U256, backrun_amount_out: U256) -> Revenue {
        let (raw, unprofitable) = match backrun_amount_out.checked_sub(frontrun_amount_in) {
            Some(profit) => (profit, profit.is_zero()),
            None => (U256::ZERO, true),
        };

        Revenue {
            raw,
            display: self.to_display(raw),
            unprofitable,
        }
    }

    /// Scale `raw` down by `unit_decimals`, rounding half up to
    /// `display_precision` places. Saturates at [`Decimal::MAX`].
    pub fn to_display(&self, raw: U256) -> Decimal {
        let (mantissa, scale) = if self.display_precision >= self.unit_decimals {
            (raw, self.unit_decimals)
        } else {
            let exponent = U256::from(self.unit_decimals - self.display_precision);
            let divisor = U256::from(10u64).pow(exponent);
            let quotient = raw / divisor;
            let remainder = raw % divisor;
            let rounded = if remainder >= divisor - remainder {
                quotient.saturating_add(U256::from(1u64))
            } else {
                quotient
            };
            (rounded, self.display_precision)
        };

        u128::try_from(mantissa)
            .ok()
            .and_then(|m| i128::try_from(m).ok())
            .and_then(|m| Decimal::try_from_i128_with_scale(m, scale).ok())
            .unwrap_or(Decimal::MAX)
    }
}
