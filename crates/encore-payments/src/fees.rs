//! Processing Fee Calculator
//!
//! The processor deducts `rate * gross + fixed` from every charge. We gross
//! up the backer's charge so the project still receives the full tier price:
//!
//! ```text
//! G - (G * r + f) = P   =>   G = ceil((P + f) / (1 - r))
//! ```
//!
//! All arithmetic is integer cents with the rate in basis points; the
//! ceiling rounds in the artist's favor.

use encore_core::Cents;

/// Default card rate: 2.9% in basis points
pub const DEFAULT_RATE_BPS: i64 = 290;

/// Default fixed per-transaction fee in cents
pub const DEFAULT_FIXED_FEE_CENTS: Cents = 30;

const BPS_SCALE: i64 = 10_000;

/// Processor fee terms
#[derive(Clone, Copy, Debug)]
pub struct FeeSchedule {
    rate_bps: i64,
    fixed_cents: Cents,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_BPS, DEFAULT_FIXED_FEE_CENTS)
    }
}

impl FeeSchedule {
    /// Create a schedule from a rate in basis points and a fixed fee in cents
    pub const fn new(rate_bps: i64, fixed_cents: Cents) -> Self {
        assert!(rate_bps >= 0 && rate_bps < BPS_SCALE);
        assert!(fixed_cents >= 0);
        Self {
            rate_bps,
            fixed_cents,
        }
    }

    /// Gross up a tier price so the project nets exactly `price_cents`
    pub fn gross_charge(&self, price_cents: Cents) -> GrossCharge {
        let numerator = (price_cents + self.fixed_cents) * BPS_SCALE;
        let divisor = BPS_SCALE - self.rate_bps;
        // Ceiling division; `i64::div_ceil` is still unstable (int_roundings)
        let total_cents =
            numerator.div_euclid(divisor) + Cents::from(numerator.rem_euclid(divisor) != 0);
        GrossCharge {
            total_cents,
            fee_cents: total_cents - price_cents,
        }
    }
}

/// A grossed-up charge: what the backer pays and the fee line on top
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrossCharge {
    /// Total charged to the backer's card
    pub total_cents: Cents,

    /// The separate processing-fee line item (`total - price`)
    pub fee_cents: Cents,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_dollar_tier() {
        // $20.00 tier at 2.9% + $0.30: ceil(2030 / 0.971) = 2091
        let charge = FeeSchedule::default().gross_charge(2000);
        assert_eq!(charge.total_cents, 2091);
        assert_eq!(charge.fee_cents, 91);
    }

    #[test]
    fn test_zero_price() {
        // Even a free tier grosses up the fixed fee
        let charge = FeeSchedule::default().gross_charge(0);
        assert_eq!(charge.total_cents, 31);
        assert_eq!(charge.fee_cents, 31);
    }

    #[test]
    fn test_net_covers_price_across_range() {
        let fees = FeeSchedule::default();
        for price in (0..=100_000).step_by(7) {
            let charge = fees.gross_charge(price);
            assert!(charge.total_cents >= price);

            // After the processor takes its cut, the project nets at least
            // the tier price, and the ceiling overshoots by under a cent
            let net = charge.total_cents as f64 * 0.971 - 30.0;
            assert!(net + 1e-6 >= price as f64, "price {price} netted {net}");
            assert!(net < price as f64 + 1.0, "price {price} netted {net}");
        }
    }

    #[test]
    fn test_custom_schedule() {
        // 5% + $1.00
        let fees = FeeSchedule::new(500, 100);
        let charge = fees.gross_charge(10_000);
        // ceil(10100 / 0.95) = 10632
        assert_eq!(charge.total_cents, 10_632);
        assert_eq!(charge.fee_cents, 632);
    }
}
