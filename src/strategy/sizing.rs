//! Confidence-banded order sizing.
//!
//! Maps a 1–10 confidence score to a cash amount between the configured
//! minimum and maximum, then converts the amount to a whole share count.

use rust_decimal::prelude::*;

/// Cash to commit for a decision of the given confidence.
///
/// | confidence | amount |
/// |---|---|
/// | ≥ 9 | `max` |
/// | 7–8 | `default + (max − default)·(c − 6)/4` |
/// | 5–6 | `default` |
/// | 3–4 | `min + (default − min)·(c − 2)/3` |
/// | ≤ 2 | `min` |
///
/// Interpolated amounts are truncated to whole currency units.
pub fn size_order(confidence: u8, min: Decimal, max: Decimal, default: Decimal) -> Decimal {
    let c = Decimal::from(confidence);
    match confidence {
        9..=u8::MAX => max,
        7..=8 => (default + (max - default) * (c - Decimal::from(6)) / Decimal::from(4)).trunc(),
        5..=6 => default,
        3..=4 => (min + (default - min) * (c - Decimal::from(2)) / Decimal::from(3)).trunc(),
        _ => min,
    }
}

/// Whole shares `amount` buys at `price`. Zero when it doesn't cover one
/// share or the price is not positive.
pub fn shares_for(amount: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO || amount <= Decimal::ZERO {
        return 0;
    }
    (amount / price).floor().to_u64().unwrap_or(0)
}
