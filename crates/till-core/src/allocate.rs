//! # Proportional Allocation
//!
//! Splits an order-level amount across cart lines in proportion to each
//! line's base amount, using largest-remainder assignment so the shares
//! always sum to the exact input amount. The tax engine uses this to spread
//! an order-level discount before resolving per-line rates, and the discount
//! engine uses it to attach line shares to a fixed-amount candidate.

use crate::money::Money;

/// Allocates `total` across `weights` proportionally, largest remainder
/// first.
///
/// Guarantees:
/// - `result.len() == weights.len()`
/// - `result.iter().sum() == total` whenever the weight sum is positive
/// - every share is non-negative for non-negative `total`
///
/// A zero or empty weight sum yields all-zero shares (nothing to allocate
/// against), leaving `total` unallocated; callers treat that as "no eligible
/// base".
///
/// ## Example
/// ```rust
/// use till_core::allocate::prorate;
/// use till_core::money::Money;
///
/// // $1.00 across three equal lines: 34 + 33 + 33.
/// let shares = prorate(Money::from_cents(100), &[500, 500, 500]);
/// assert_eq!(shares.iter().map(|s| s.cents()).sum::<i64>(), 100);
/// ```
pub fn prorate(total: Money, weights: &[i64]) -> Vec<Money> {
    let weight_sum: i128 = weights.iter().map(|w| (*w).max(0) as i128).sum();
    if weight_sum <= 0 || weights.is_empty() {
        return vec![Money::zero(); weights.len()];
    }

    let total_c = total.cents() as i128;

    // Floor shares first, tracking each line's remainder.
    let mut shares: Vec<i128> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(weights.len());
    let mut allocated: i128 = 0;

    for (idx, w) in weights.iter().enumerate() {
        let w = (*w).max(0) as i128;
        let numer = total_c * w;
        let share = numer.div_euclid(weight_sum);
        let rem = numer.rem_euclid(weight_sum);
        shares.push(share);
        remainders.push((idx, rem));
        allocated += share;
    }

    // Hand out the leftover cents to the largest remainders. Ties break on
    // line position so the result is deterministic.
    let mut leftover = total_c - allocated;
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut cursor = 0usize;
    while leftover > 0 && cursor < remainders.len() {
        shares[remainders[cursor].0] += 1;
        leftover -= 1;
        cursor += 1;
    }

    shares.into_iter().map(|s| Money::from_cents(s as i64)).collect()
}
