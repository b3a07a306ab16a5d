//! Rate Resolution
//!
//! Maps a tier to its per-category commission rates.
//!
//! # Rate Table Layout
//!
//! The backend's rate table is grouped by tier, and every group ends with a
//! grand-total row that is not a real rate:
//!
//! ```text
//! tier 1 | 0.50 | 0.40 | 0.30 | 0.20 | 0.10    <- rates for tier 1
//! tier 1 | 1.50 | ...                          <- aggregate, dropped
//! tier 2 | 0.70 | ...
//! tier 2 | 2.10 | ...                          <- aggregate, dropped
//! ```
//!
//! After the aggregate row is dropped, each tier must have exactly one row.
//!
//! # Override Precedence
//!
//! `Locked(t)` > `Special(t)` with t != 0 > team tier.

use crate::core::money::{to_rate_units, MoneyError, RATE_SCALE};
use crate::models::member::{BetCategory, RebateMode};
use crate::source::RateRow;
use crate::tier::TierOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while building or querying a rate schedule
#[derive(Debug, Error, PartialEq)]
pub enum RateError {
    #[error("Rate table is empty")]
    EmptyTable,

    #[error("Tier {tier} has only its aggregate row")]
    AggregateOnly { tier: i32 },

    #[error("Tier {tier} has {rows} rate rows besides the aggregate, expected 1")]
    AmbiguousRows { tier: i32, rows: usize },

    #[error("Tier {tier} rate for {category} is invalid: {source}")]
    InvalidRate {
        tier: i32,
        category: BetCategory,
        source: MoneyError,
    },

    #[error("No rates configured for tier {tier}")]
    UnknownTier { tier: i32 },
}

/// Rate vector in rate units (percent × 10_000), in [`BetCategory::ALL`] order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRates([i64; 5]);

impl CategoryRates {
    pub const ZERO: CategoryRates = CategoryRates([0; 5]);

    /// Build from rate units directly
    pub fn from_units(units: [i64; 5]) -> Self {
        Self(units)
    }

    /// Build from percentages (0-100)
    ///
    /// # Example
    /// ```
    /// use rebate_engine_core::{BetCategory, CategoryRates};
    ///
    /// let rates = CategoryRates::from_percentages([5.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    /// assert_eq!(rates.get(BetCategory::ElectronicGame), 50_000);
    /// ```
    pub fn from_percentages(percentages: [f64; 5]) -> Result<Self, MoneyError> {
        let mut units = [0i64; 5];
        for (slot, percent) in units.iter_mut().zip(percentages) {
            *slot = to_rate_units(percent)?;
        }
        Ok(Self(units))
    }

    /// Rate for a category in rate units
    pub fn get(&self, category: BetCategory) -> i64 {
        self.0[category.index()]
    }

    /// Rate for a category as a percentage, for display
    pub fn percentage(&self, category: BetCategory) -> f64 {
        self.get(category) as f64 / RATE_SCALE as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&rate| rate == 0)
    }

    fn from_row(row: &RateRow) -> Result<Self, RateError> {
        let percentages = [
            row.rate_electronic_game,
            row.rate_live_casino,
            row.rate_sports,
            row.rate_lottery,
            row.rate_chess_card,
        ];
        let mut units = [0i64; 5];
        for (category, percent) in BetCategory::ALL.into_iter().zip(percentages) {
            units[category.index()] =
                to_rate_units(percent).map_err(|source| RateError::InvalidRate {
                    tier: row.tier,
                    category,
                    source,
                })?;
        }
        Ok(Self(units))
    }
}

/// Validated tier -> rates lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSchedule {
    by_tier: BTreeMap<i32, CategoryRates>,
}

impl RateSchedule {
    /// Build a schedule from the backend's grouped rate table
    ///
    /// Rows of one tier need not be adjacent; each tier's last row in table
    /// order is taken as its aggregate.
    pub fn from_rows(rows: &[RateRow]) -> Result<Self, RateError> {
        if rows.is_empty() {
            return Err(RateError::EmptyTable);
        }

        let mut groups: BTreeMap<i32, Vec<&RateRow>> = BTreeMap::new();
        for row in rows {
            groups.entry(row.tier).or_default().push(row);
        }

        let mut by_tier = BTreeMap::new();
        for (tier, mut group) in groups {
            // Trailing grand-total row
            group.pop();
            match group.as_slice() {
                [] => return Err(RateError::AggregateOnly { tier }),
                [row] => {
                    by_tier.insert(tier, CategoryRates::from_row(row)?);
                }
                many => {
                    return Err(RateError::AmbiguousRows {
                        tier,
                        rows: many.len(),
                    })
                }
            }
        }

        Ok(Self { by_tier })
    }

    /// Rates for a concrete tier
    pub fn rates_for(&self, tier: i32) -> Result<CategoryRates, RateError> {
        self.by_tier
            .get(&tier)
            .copied()
            .ok_or(RateError::UnknownTier { tier })
    }

    /// Rates for a classification outcome; "no tier" earns nothing
    pub fn rates_for_outcome(&self, outcome: TierOutcome) -> Result<CategoryRates, RateError> {
        match outcome.tier() {
            Some(tier) => self.rates_for(tier),
            None => Ok(CategoryRates::ZERO),
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = i32> + '_ {
        self.by_tier.keys().copied()
    }
}

/// Tier whose rates apply to a member
///
/// # Example
/// ```
/// use rebate_engine_core::{resolve_target_tier, RebateMode, TierOutcome};
///
/// let team = TierOutcome::Qualified(2);
/// assert_eq!(resolve_target_tier(RebateMode::Normal, team), TierOutcome::Qualified(2));
/// assert_eq!(resolve_target_tier(RebateMode::Locked(5), team), TierOutcome::Qualified(5));
/// assert_eq!(resolve_target_tier(RebateMode::Special(0), team), TierOutcome::Qualified(2));
/// ```
pub fn resolve_target_tier(mode: RebateMode, team_tier: TierOutcome) -> TierOutcome {
    match mode {
        RebateMode::Locked(tier) => TierOutcome::Qualified(tier),
        RebateMode::Special(tier) if tier != 0 => TierOutcome::Qualified(tier),
        RebateMode::Special(_) | RebateMode::Normal => team_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tier: i32, electronic: f64) -> RateRow {
        RateRow {
            tier,
            rate_electronic_game: electronic,
            rate_live_casino: 0.4,
            rate_sports: 0.3,
            rate_lottery: 0.2,
            rate_chess_card: 0.1,
        }
    }

    #[test]
    fn test_aggregate_row_is_dropped() {
        let schedule = RateSchedule::from_rows(&[row(1, 0.5), row(1, 1.5)]).unwrap();
        let rates = schedule.rates_for(1).unwrap();
        assert_eq!(rates.get(BetCategory::ElectronicGame), 5_000);
        assert_eq!(rates.get(BetCategory::ChessCard), 1_000);
    }

    #[test]
    fn test_aggregate_only_group_is_rejected() {
        let err = RateSchedule::from_rows(&[row(1, 0.5), row(1, 1.5), row(2, 3.0)]).unwrap_err();
        assert_eq!(err, RateError::AggregateOnly { tier: 2 });
    }

    #[test]
    fn test_sentinel_outcomes_earn_nothing() {
        let schedule = RateSchedule::from_rows(&[row(1, 0.5), row(1, 1.5)]).unwrap();
        assert!(schedule
            .rates_for_outcome(TierOutcome::BelowFloor)
            .unwrap()
            .is_zero());
        assert_eq!(
            schedule.rates_for_outcome(TierOutcome::Qualified(9)),
            Err(RateError::UnknownTier { tier: 9 })
        );
    }

    #[test]
    fn test_locked_overrides_no_activity() {
        assert_eq!(
            resolve_target_tier(RebateMode::Locked(1), TierOutcome::NoActivity),
            TierOutcome::Qualified(1)
        );
    }
}
