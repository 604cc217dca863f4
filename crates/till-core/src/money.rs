//! # Money Module
//!
//! Monetary values as integer minor units (cents), with the rounding
//! primitives the tax engine is built on.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                         │
//! │                                                                     │
//! │  In floating point:                                                 │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                       │
//! │                                                                     │
//! │  OUR SOLUTION: Integer Cents                                        │
//! │    1000 cents / 3 = 333 cents (×3 = 999 cents)                      │
//! │    We KNOW we lost 1 cent, and handle it explicitly                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Percentages are basis points (`u32`): 10 000 bps = 100%. Intermediate tax
//! math runs in micro-cents (`i128`, one millionth of a cent) so that
//! receipt-level rounding sees full precision before a single rounding step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Basis-point scale: 10 000 bps = 100%.
pub const BPS_SCALE: i128 = 10_000;

/// Micro-cents per cent. One micro-cent is the smallest unit the tax engine
/// tracks before rounding.
pub const MICROS_PER_CENT: i128 = 1_000_000;

// =============================================================================
// Rounding Strategy
// =============================================================================

/// How a fractional cent is resolved.
///
/// `HalfUp` rounds ties away from zero. `Bankers` rounds ties to the nearest
/// even cent, which avoids systematic bias over many transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingStrategy {
    #[default]
    HalfUp,
    Bankers,
}

/// Rounds `num / den` to the nearest integer under the given strategy.
///
/// `den` must be positive. The non-tie cases are strategy-independent; only
/// an exact half differs.
pub(crate) fn div_round(num: i128, den: i128, strategy: RoundingStrategy) -> i128 {
    debug_assert!(den > 0);
    let q = num.div_euclid(den);
    let r = num.rem_euclid(den);
    let twice = r * 2;
    if twice > den {
        return q + 1;
    }
    if twice < den {
        return q;
    }
    match strategy {
        // Exactly halfway: away from zero.
        RoundingStrategy::HalfUp => {
            if num >= 0 {
                q + 1
            } else {
                q
            }
        }
        // Exactly halfway: toward the even neighbour.
        RoundingStrategy::Bankers => {
            if q % 2 == 0 {
                q
            } else {
                q + 1
            }
        }
    }
}

/// Rounds a micro-cent amount to whole cents.
pub fn round_micros(micros: i128, strategy: RoundingStrategy) -> i64 {
    div_round(micros, MICROS_PER_CENT, strategy) as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// Signed so refunds, adjustments, and credit deltas are representable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the value in micro-cents for full-precision intermediates.
    #[inline]
    pub const fn micros(&self) -> i128 {
        self.0 as i128 * MICROS_PER_CENT
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Returns the smaller of two values.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// Multiplies by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Takes a basis-point fraction of this amount, rounded to whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::{Money, RoundingStrategy};
    ///
    /// let subtotal = Money::from_cents(10_000); // $100.00
    /// let ten_pct = subtotal.percent_bps(1_000, RoundingStrategy::HalfUp);
    /// assert_eq!(ten_pct.cents(), 1_000); // $10.00
    /// ```
    pub fn percent_bps(&self, bps: u32, strategy: RoundingStrategy) -> Money {
        let amount = div_round(self.0 as i128 * bps as i128, BPS_SCALE, strategy);
        Money(amount as i64)
    }

    /// Rounds to the nearest multiple of `increment` cents, ties away from
    /// zero. Used for cash rounding of a grand total.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let total = Money::from_cents(11_503); // $115.03
    /// assert_eq!(total.round_to_increment(5).cents(), 11_505);
    /// ```
    pub fn round_to_increment(&self, increment: i64) -> Money {
        if increment <= 1 {
            return *self;
        }
        let steps = div_round(self.0 as i128, increment as i128, RoundingStrategy::HalfUp);
        Money((steps * increment as i128) as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display; receipt formatting is a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!(a.multiply_quantity(4).cents(), 4000);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "0.00");
    }

    #[test]
    fn test_percent_bps_half_up() {
        // $10.00 at 8.25% = $0.825 → $0.83
        let amount = Money::from_cents(1000);
        assert_eq!(amount.percent_bps(825, RoundingStrategy::HalfUp).cents(), 83);

        // $100.00 at 10% = $10.00 exactly
        let subtotal = Money::from_cents(10_000);
        assert_eq!(subtotal.percent_bps(1000, RoundingStrategy::HalfUp).cents(), 1000);
    }

    #[test]
    fn test_percent_bps_bankers() {
        // $0.25 at 10% = 2.5 cents → 2 (even)
        assert_eq!(Money::from_cents(25).percent_bps(1000, RoundingStrategy::Bankers).cents(), 2);
        // $0.35 at 10% = 3.5 cents → 4 (even)
        assert_eq!(Money::from_cents(35).percent_bps(1000, RoundingStrategy::Bankers).cents(), 4);
    }

    #[test]
    fn test_div_round_ties() {
        assert_eq!(div_round(25, 10, RoundingStrategy::HalfUp), 3);
        assert_eq!(div_round(-25, 10, RoundingStrategy::HalfUp), -3);
        assert_eq!(div_round(25, 10, RoundingStrategy::Bankers), 2);
        assert_eq!(div_round(35, 10, RoundingStrategy::Bankers), 4);
        assert_eq!(div_round(-25, 10, RoundingStrategy::Bankers), -2);
    }

    #[test]
    fn test_round_micros() {
        // 82.5 cents in micros
        let micros = 82 * MICROS_PER_CENT + 500_000;
        assert_eq!(round_micros(micros, RoundingStrategy::HalfUp), 83);
        assert_eq!(round_micros(micros, RoundingStrategy::Bankers), 82);
    }

    #[test]
    fn test_round_to_increment() {
        let nickel = 5;
        assert_eq!(Money::from_cents(11_500).round_to_increment(nickel).cents(), 11_500);
        assert_eq!(Money::from_cents(11_503).round_to_increment(nickel).cents(), 11_505);
        assert_eq!(Money::from_cents(11_502).round_to_increment(nickel).cents(), 11_500);
        // Increment of 1 is a no-op.
        assert_eq!(Money::from_cents(11_503).round_to_increment(1).cents(), 11_503);
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative().cents(), 0);
        assert_eq!(Money::from_cents(7).clamp_non_negative().cents(), 7);
    }

    /// Splitting $10.00 three ways loses a documented cent.
    #[test]
    fn test_division_precision_loss_documented() {
        let ten = Money::from_cents(1000);
        let third = Money::from_cents(1000 / 3);
        let reconstructed = third * 3;
        assert_eq!(reconstructed.cents(), 999);
        assert_eq!((ten - reconstructed).cents(), 1);
    }
}
