//! Canonical units and integer helpers.
//!
//! ## Units
//! - Amounts are micro-units of a USD stablecoin (6 decimals): 1 USD = 1,000,000
//! - Percentages are basis points: 10,000 bps = 100%
//! - Timestamps are seconds
//! - NO floating point is allowed in ledger arithmetic

// =============================================================================
// CANONICAL UNITS
// =============================================================================

/// Amount in micro-units (smallest unit, 6 decimals)
pub type Amount = u128;

/// Timestamp in seconds
pub type Timestamp = u64;

/// Basis points (10000 = 100%)
pub type Bps = u16;

/// Epoch number (one deposit-and-distribute cycle)
pub type WeekNumber = u64;

/// Number of micro-units per whole USD
pub const MICROS_PER_USD: Amount = 1_000_000;

/// Basis point denominator
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Seconds per day
pub const DAY_SECS: u64 = 24 * 60 * 60;

/// Seconds per week
pub const WEEK_SECS: u64 = 7 * DAY_SECS;

/// Depth of the unilevel commission plan
pub const MAX_LEVELS: usize = 10;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Convert whole USD to micro-units (saturating)
#[inline]
pub const fn usd(whole: u64) -> Amount {
    (whole as Amount).saturating_mul(MICROS_PER_USD)
}

/// Convert micro-units to whole USD (truncating)
#[inline]
pub const fn micros_to_usd(amount: Amount) -> Amount {
    amount / MICROS_PER_USD
}

/// Safe multiplication followed by division.
/// Returns None if the divisor is zero or the product overflows.
#[inline]
pub fn mul_div_u128(n: u128, mul: u128, div: u128) -> Option<u128> {
    if div == 0 {
        return None;
    }
    n.checked_mul(mul).map(|product| product / div)
}

/// `amount * bps / 10000`, floored. None on overflow.
#[inline]
pub fn apply_bps(amount: Amount, bps: Bps) -> Option<Amount> {
    mul_div_u128(amount, bps as u128, BPS_DENOMINATOR)
}

/// `numerator * 10000 / denominator` clamped into u64.
/// A zero denominator means "nothing owed", reported as `u64::MAX`.
pub fn ratio_bps(numerator: Amount, denominator: Amount) -> u64 {
    if denominator == 0 {
        return u64::MAX;
    }
    match numerator.checked_mul(BPS_DENOMINATOR) {
        Some(scaled) => u64::try_from(scaled / denominator).unwrap_or(u64::MAX),
        // numerator * 10000 overflowed: divide first, precision is irrelevant at that size
        None => u64::try_from((numerator / denominator).saturating_mul(BPS_DENOMINATOR))
            .unwrap_or(u64::MAX),
    }
}

/// Format micro-units as a dollar string with two decimals (for logs and reports).
pub fn format_usd(amount: Amount) -> String {
    let cents = amount / (MICROS_PER_USD / 100);
    format!("${}.{:02}", cents / 100, cents % 100)
}
