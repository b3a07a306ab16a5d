//! Commission Calculation
//!
//! Applies resolved rates to each member's individual bets and accumulates
//! the result into the six rebate level buckets.
//!
//! # Critical Invariants
//!
//! 1. **Per-bet precision**: commission is summed bet by bet
//!    (`Σ bet × rate / 100`), never from a pre-summed category total
//! 2. **Exactness**: products are exact i128 micro-cents; no rounding until
//!    a total is reported
//! 3. **Conservation**: the sum of the level buckets equals the sum of the
//!    commissions added to them

use crate::core::money::MicroCents;
use crate::models::member::{BetCategory, CategoryBets};
use crate::rates::CategoryRates;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deepest relative level that earns the reference agent a rebate
pub const MAX_REBATE_LEVEL: i32 = 6;

/// A member's level has no bucket
#[derive(Debug, Error, PartialEq)]
#[error("Relative level {level} is outside rebate levels 1..={max}", max = MAX_REBATE_LEVEL)]
pub struct LevelOutOfRange {
    pub level: i32,
}

/// One member's commission, per category and in total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCommission {
    by_category: [MicroCents; 5],
    total: MicroCents,
}

impl MemberCommission {
    pub fn category(&self, category: BetCategory) -> MicroCents {
        self.by_category[category.index()]
    }

    pub fn total(&self) -> MicroCents {
        self.total
    }
}

/// Commission a member's bets earn at the given rates
///
/// # Example
/// ```
/// use rebate_engine_core::{member_commission, BetCategory, CategoryBets, CategoryRates};
///
/// let rates = CategoryRates::from_percentages([5.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
/// let bets = CategoryBets::new().with_bets(BetCategory::ElectronicGame, &[100_000, 200_000]);
///
/// // 1000.00 * 5% + 2000.00 * 5%
/// assert_eq!(member_commission(&bets, &rates).total().to_string(), "150.00");
/// ```
pub fn member_commission(bets: &CategoryBets, rates: &CategoryRates) -> MemberCommission {
    let mut commission = MemberCommission::default();

    for category in BetCategory::ALL {
        let rate = rates.get(category);
        let subtotal: MicroCents = bets
            .get(category)
            .iter()
            .map(|&bet| MicroCents::from_bet(bet, rate))
            .sum();
        commission.by_category[category.index()] = subtotal;
    }

    commission.total = commission.by_category.iter().sum();
    commission
}

/// Commission accumulators for relative levels 1..=6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRebateTotals {
    levels: [MicroCents; MAX_REBATE_LEVEL as usize],
}

impl LevelRebateTotals {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(level: i32) -> Result<usize, LevelOutOfRange> {
        if (1..=MAX_REBATE_LEVEL).contains(&level) {
            Ok((level - 1) as usize)
        } else {
            Err(LevelOutOfRange { level })
        }
    }

    /// Add commission to a level's bucket
    ///
    /// Levels outside 1..=6 are rejected and nothing is added.
    pub fn add(&mut self, level: i32, amount: MicroCents) -> Result<(), LevelOutOfRange> {
        let slot = Self::slot(level)?;
        self.levels[slot] += amount;
        Ok(())
    }

    pub fn get(&self, level: i32) -> Result<MicroCents, LevelOutOfRange> {
        Ok(self.levels[Self::slot(level)?])
    }

    /// `(level, total)` pairs for levels 1..=6
    pub fn iter(&self) -> impl Iterator<Item = (i32, MicroCents)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, &total)| (i as i32 + 1, total))
    }

    /// Sum across all levels
    pub fn total(&self) -> MicroCents {
        self.levels.iter().sum()
    }

    /// Per-level totals rounded to cents, for reporting
    pub fn to_cents(&self) -> [i64; MAX_REBATE_LEVEL as usize] {
        self.levels.map(MicroCents::to_cents)
    }
}
