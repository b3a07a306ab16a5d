//! Tier Classification
//!
//! Derives the team's commission tier from aggregated team performance.
//!
//! # Algorithm
//!
//! ```text
//! all three metrics zero        -> NoActivity    (-1)
//! thresholds empty              -> Misconfigured (-3)
//! scan highest tier downward:
//!   count  > min_recharge_count
//!   amount > min_recharge_amount
//!   bet    > min_bet_amount     -> Qualified(tier)
//! nothing qualified             -> BelowFloor    (-1)
//! ```
//!
//! Every threshold must be *strictly* exceeded. The scan relies on the table
//! being strictly increasing by tier; [`validate_thresholds`] checks that
//! contract once per run, before classification.

use crate::core::money::{to_cents, MoneyError};
use crate::source::TierThresholdRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Sentinel the production backend uses for "no tier"
pub const NO_TIER_CODE: i32 = -1;

/// Sentinel the production backend uses for "threshold table missing"
pub const MISCONFIGURED_CODE: i32 = -3;

/// Errors raised by threshold table checks
#[derive(Debug, Error, PartialEq)]
pub enum TierTableError {
    #[error("Tier threshold table is empty")]
    Empty,

    #[error("Tier {tier} has an invalid amount: {source}")]
    InvalidAmount { tier: i32, source: MoneyError },

    #[error("Tier {tier} has a negative threshold")]
    NegativeThreshold { tier: i32 },

    #[error("Tier thresholds not strictly increasing: tier {previous} then tier {tier} ({field})")]
    NotIncreasing {
        previous: i32,
        tier: i32,
        field: &'static str,
    },
}

impl TierTableError {
    /// Ordering violations break the classifier's contract; the rest are
    /// plain configuration mistakes
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, TierTableError::NotIncreasing { .. })
    }
}

/// One tier's qualification thresholds (amounts in i64 cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub tier: i32,
    pub min_recharge_count: u64,
    pub min_recharge_amount: i64,
    pub min_bet_amount: i64,
}

impl TierThreshold {
    /// Convert a backend row (decimal currency amounts) into cents
    pub fn from_row(row: &TierThresholdRow) -> Result<Self, TierTableError> {
        let amount = |value: f64| {
            to_cents(value).map_err(|source| TierTableError::InvalidAmount {
                tier: row.tier,
                source,
            })
        };
        let threshold = Self {
            tier: row.tier,
            min_recharge_count: row.min_recharge_count,
            min_recharge_amount: amount(row.min_recharge_amount)?,
            min_bet_amount: amount(row.min_bet_amount)?,
        };
        if threshold.min_recharge_amount < 0 || threshold.min_bet_amount < 0 {
            return Err(TierTableError::NegativeThreshold { tier: row.tier });
        }
        Ok(threshold)
    }

    /// All three thresholds strictly exceeded by the team
    pub fn is_met_by(&self, metrics: &TeamMetrics) -> bool {
        self.min_recharge_count < metrics.recharging_count
            && self.min_recharge_amount < metrics.total_recharge
            && self.min_bet_amount < metrics.total_bet
    }
}

/// Team-level aggregates the classifier works on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Members with at least one paid recharge in the window
    pub recharging_count: u64,
    /// Paid recharges across the team (cents)
    pub total_recharge: i64,
    /// Bets across the team and every category (cents)
    pub total_bet: i64,
}

impl TeamMetrics {
    pub fn is_zero(&self) -> bool {
        self.recharging_count == 0 && self.total_recharge == 0 && self.total_bet == 0
    }
}

/// Result of tier classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "tier")]
pub enum TierOutcome {
    Qualified(i32),
    /// All metrics zero
    NoActivity,
    /// Activity present but below every tier
    BelowFloor,
    /// Threshold table empty
    Misconfigured,
}

impl TierOutcome {
    /// Integer code matching the production backend's sentinels
    pub fn code(self) -> i32 {
        match self {
            TierOutcome::Qualified(tier) => tier,
            TierOutcome::NoActivity | TierOutcome::BelowFloor => NO_TIER_CODE,
            TierOutcome::Misconfigured => MISCONFIGURED_CODE,
        }
    }

    pub fn tier(self) -> Option<i32> {
        match self {
            TierOutcome::Qualified(tier) => Some(tier),
            _ => None,
        }
    }
}

impl fmt::Display for TierOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierOutcome::Qualified(tier) => write!(f, "tier {}", tier),
            TierOutcome::NoActivity => f.write_str("no activity"),
            TierOutcome::BelowFloor => f.write_str("below floor"),
            TierOutcome::Misconfigured => f.write_str("misconfigured"),
        }
    }
}

/// Classify the team tier
///
/// `thresholds` must be ordered ascending by tier.
///
/// # Example
/// ```
/// use rebate_engine_core::{classify_tier, TeamMetrics, TierOutcome, TierThreshold};
///
/// let thresholds = [
///     TierThreshold { tier: 1, min_recharge_count: 10, min_recharge_amount: 1_000_000, min_bet_amount: 5_000_000 },
///     TierThreshold { tier: 2, min_recharge_count: 20, min_recharge_amount: 8_000_000, min_bet_amount: 15_000_000 },
/// ];
/// let team = TeamMetrics { recharging_count: 12, total_recharge: 5_000_000, total_bet: 20_000_000 };
///
/// assert_eq!(classify_tier(&team, &thresholds), TierOutcome::Qualified(1));
/// ```
pub fn classify_tier(metrics: &TeamMetrics, thresholds: &[TierThreshold]) -> TierOutcome {
    if metrics.is_zero() {
        return TierOutcome::NoActivity;
    }
    if thresholds.is_empty() {
        return TierOutcome::Misconfigured;
    }

    thresholds
        .iter()
        .rev()
        .find(|threshold| threshold.is_met_by(metrics))
        .map(|threshold| TierOutcome::Qualified(threshold.tier))
        .unwrap_or(TierOutcome::BelowFloor)
}

/// Check the threshold table is usable by [`classify_tier`]
///
/// Tiers and each of the three thresholds must be strictly increasing.
pub fn validate_thresholds(thresholds: &[TierThreshold]) -> Result<(), TierTableError> {
    if thresholds.is_empty() {
        return Err(TierTableError::Empty);
    }

    for pair in thresholds.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let violation = if previous.tier >= current.tier {
            Some("tier")
        } else if previous.min_recharge_count >= current.min_recharge_count {
            Some("min_recharge_count")
        } else if previous.min_recharge_amount >= current.min_recharge_amount {
            Some("min_recharge_amount")
        } else if previous.min_bet_amount >= current.min_bet_amount {
            Some("min_bet_amount")
        } else {
            None
        };

        if let Some(field) = violation {
            return Err(TierTableError::NotIncreasing {
                previous: previous.tier,
                tier: current.tier,
                field,
            });
        }
    }

    Ok(())
}
