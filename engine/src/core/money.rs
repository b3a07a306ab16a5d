//! Money arithmetic
//!
//! Backend figures arrive as decimal currency units (`f64`). They are
//! converted once, at the boundary, into integer representations:
//!
//! - amounts: i64 cents
//! - rates: i64 percent scaled by [`RATE_SCALE`] (5% = 50_000)
//! - commission: i128 micro-cents, the exact product `cents × rate_units`
//!
//! A per-bet commission therefore never rounds. Totals are rounded to whole
//! cents (half away from zero) only when reported.
//!
//! CRITICAL: No float ever participates in accumulation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use thiserror::Error;

/// Cents per currency unit
pub const CENTS_PER_UNIT: i64 = 100;

/// Scale applied to a percentage rate (four decimal places of a percent)
pub const RATE_SCALE: i64 = 10_000;

/// Micro-cents per cent: 100 (percent) × RATE_SCALE
pub const MICRO_CENTS_PER_CENT: i128 = 100 * RATE_SCALE as i128;

/// Largest cent magnitude a f64 represents exactly (2^53 - 1)
const MAX_EXACT_CENTS: f64 = 9_007_199_254_740_991.0;

/// Largest distance from a whole rate unit still treated as float noise
const RATE_PRECISION_TOLERANCE: f64 = 1e-6;

/// Errors raised when converting backend figures into integer money
#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Amount is not a finite number: {0}")]
    NotFinite(f64),

    #[error("Amount {0} exceeds the exactly representable cent range")]
    OutOfRange(f64),

    #[error("Rate must be a percentage within 0-100, got {0}")]
    RateOutOfRange(f64),

    #[error("Rate {0}% is finer than 1/10000 of a percent")]
    RatePrecision(f64),

    #[error("Cent total exceeds the i64 range")]
    SumOverflow,
}

/// Convert a decimal currency amount to integer cents
///
/// # Example
/// ```
/// use rebate_engine_core::core::money::to_cents;
///
/// assert_eq!(to_cents(1000.0).unwrap(), 100_000);
/// assert_eq!(to_cents(0.29).unwrap(), 29);
/// assert!(to_cents(f64::NAN).is_err());
/// ```
pub fn to_cents(amount: f64) -> Result<i64, MoneyError> {
    if !amount.is_finite() {
        return Err(MoneyError::NotFinite(amount));
    }
    let scaled = (amount * CENTS_PER_UNIT as f64).round();
    if scaled.abs() > MAX_EXACT_CENTS {
        return Err(MoneyError::OutOfRange(amount));
    }
    Ok(scaled as i64)
}

/// Convert a percentage (0-100) into rate units of 1/10_000 percent
///
/// # Example
/// ```
/// use rebate_engine_core::core::money::to_rate_units;
///
/// assert_eq!(to_rate_units(5.0).unwrap(), 50_000);
/// assert_eq!(to_rate_units(0.35).unwrap(), 3_500);
/// ```
pub fn to_rate_units(percent: f64) -> Result<i64, MoneyError> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(MoneyError::RateOutOfRange(percent));
    }
    let scaled = percent * RATE_SCALE as f64;
    let units = scaled.round();
    // Tolerate float noise only; real extra digits would be silently lost
    if (scaled - units).abs() > RATE_PRECISION_TOLERANCE {
        return Err(MoneyError::RatePrecision(percent));
    }
    Ok(units as i64)
}

/// Add cents to a running total, failing instead of wrapping
///
/// # Example
/// ```
/// use rebate_engine_core::core::money::add_cents;
///
/// assert_eq!(add_cents(150, 50).unwrap(), 200);
/// assert!(add_cents(i64::MAX, 1).is_err());
/// ```
pub fn add_cents(total: i64, amount: i64) -> Result<i64, MoneyError> {
    total.checked_add(amount).ok_or(MoneyError::SumOverflow)
}

/// Render cents as a two-decimal string ("150.00", "-0.05")
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!(
        "{}{}.{:02}",
        sign,
        abs / CENTS_PER_UNIT as u64,
        abs % CENTS_PER_UNIT as u64
    )
}

/// Exact commission accumulator in micro-cents (1e-6 cent)
///
/// Produced by multiplying a bet in cents by a rate in rate units.
/// Addition is exact; [`MicroCents::to_cents`] is the single rounding point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MicroCents(i128);

impl MicroCents {
    pub const ZERO: MicroCents = MicroCents(0);

    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    /// Commission earned by one bet at one rate
    pub fn from_bet(bet_cents: i64, rate_units: i64) -> Self {
        Self(bet_cents as i128 * rate_units as i128)
    }

    /// Raw micro-cent value
    pub fn raw(self) -> i128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Round to whole cents, half away from zero
    ///
    /// # Example
    /// ```
    /// use rebate_engine_core::MicroCents;
    ///
    /// assert_eq!(MicroCents::new(1_500_000).to_cents(), 2);
    /// assert_eq!(MicroCents::new(1_499_999).to_cents(), 1);
    /// assert_eq!(MicroCents::new(-1_500_000).to_cents(), -2);
    /// ```
    pub fn to_cents(self) -> i64 {
        let quotient = self.0 / MICRO_CENTS_PER_CENT;
        let remainder = self.0 % MICRO_CENTS_PER_CENT;
        let adjust = if remainder.abs() * 2 >= MICRO_CENTS_PER_CENT {
            self.0.signum()
        } else {
            0
        };
        let rounded = quotient + adjust;
        i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
    }
}

impl Add for MicroCents {
    type Output = MicroCents;

    fn add(self, rhs: MicroCents) -> MicroCents {
        MicroCents(self.0 + rhs.0)
    }
}

impl AddAssign for MicroCents {
    fn add_assign(&mut self, rhs: MicroCents) {
        self.0 += rhs.0;
    }
}

impl Sum for MicroCents {
    fn sum<I: Iterator<Item = MicroCents>>(iter: I) -> Self {
        iter.fold(MicroCents::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a MicroCents> for MicroCents {
    fn sum<I: Iterator<Item = &'a MicroCents>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for MicroCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cents(self.to_cents()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cents_rounds_float_noise() {
        // 0.29 * 100 = 28.999999999999996 in f64
        assert_eq!(to_cents(0.29).unwrap(), 29);
        assert_eq!(to_cents(-12.34).unwrap(), -1234);
    }

    #[test]
    fn test_to_cents_rejects_non_finite() {
        assert_eq!(to_cents(f64::INFINITY), Err(MoneyError::NotFinite(f64::INFINITY)));
        assert!(to_cents(f64::NAN).is_err());
        assert!(matches!(to_cents(1e17), Err(MoneyError::OutOfRange(_))));
    }

    #[test]
    fn test_rate_units_bounds() {
        assert_eq!(to_rate_units(0.0).unwrap(), 0);
        assert_eq!(to_rate_units(100.0).unwrap(), 1_000_000);
        assert!(to_rate_units(100.01).is_err());
        assert!(to_rate_units(-0.5).is_err());
    }

    #[test]
    fn test_rate_units_reject_sub_unit_precision() {
        assert_eq!(to_rate_units(0.0001).unwrap(), 1);
        assert_eq!(to_rate_units(0.35).unwrap(), 3_500);
        assert_eq!(
            to_rate_units(0.00015),
            Err(MoneyError::RatePrecision(0.00015))
        );
    }

    #[test]
    fn test_add_cents_reports_overflow() {
        assert_eq!(add_cents(-5, 5), Ok(0));
        assert_eq!(add_cents(i64::MAX, 1), Err(MoneyError::SumOverflow));
        assert_eq!(add_cents(i64::MIN, -1), Err(MoneyError::SumOverflow));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(15_000), "150.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-5), "-0.05");
        assert_eq!(format_cents(0), "0.00");
    }

    #[test]
    fn test_micro_cents_display_rounds_once() {
        // 3 bets of 0.333... cents each: rounding per bet would give 0.00
        let total: MicroCents = (0..3).map(|_| MicroCents::new(333_334)).sum();
        assert_eq!(total.to_cents(), 1);
        assert_eq!(total.to_string(), "0.01");
    }
}
