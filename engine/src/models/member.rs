//! Member model
//!
//! A participant in the referral hierarchy, positioned relative to the
//! reference agent whose commission is being verified. Each member has:
//! - Relative level (1 = direct referral)
//! - Rebate mode (automatic team tier, or a manual override)
//! - Window activity: paid recharges, first-charge flag, individual bets
//!
//! Members are created fresh for every computation run and never persisted.
//!
//! CRITICAL: All money values are i64 (cents)

use crate::core::money::{add_cents, MoneyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a member's rebate tier is chosen
///
/// Precedence when resolving rates: `Locked` > `Special` (non-zero) > team tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "tier")]
pub enum RebateMode {
    /// Tier follows the team's classified performance
    #[default]
    Normal,

    /// Tier pinned manually, regardless of team performance
    Locked(i32),

    /// Special tier grant; zero means "no grant" and falls back to the team tier
    Special(i32),
}

/// Wagering product line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BetCategory {
    ElectronicGame,
    LiveCasino,
    Sports,
    Lottery,
    ChessCard,
}

impl BetCategory {
    /// All categories, in rate-vector order
    pub const ALL: [BetCategory; 5] = [
        BetCategory::ElectronicGame,
        BetCategory::LiveCasino,
        BetCategory::Sports,
        BetCategory::Lottery,
        BetCategory::ChessCard,
    ];

    /// Position in rate vectors and category arrays
    pub fn index(self) -> usize {
        match self {
            BetCategory::ElectronicGame => 0,
            BetCategory::LiveCasino => 1,
            BetCategory::Sports => 2,
            BetCategory::Lottery => 3,
            BetCategory::ChessCard => 4,
        }
    }
}

impl fmt::Display for BetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetCategory::ElectronicGame => "electronic_game",
            BetCategory::LiveCasino => "live_casino",
            BetCategory::Sports => "sports",
            BetCategory::Lottery => "lottery",
            BetCategory::ChessCard => "chess_card",
        };
        f.write_str(name)
    }
}

/// Individual bet amounts (cents) per category
///
/// Bets are kept one by one rather than pre-summed so commission can be
/// computed per bet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBets {
    bets: [Vec<i64>; 5],
}

impl CategoryBets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: BetCategory, amount_cents: i64) {
        self.bets[category.index()].push(amount_cents);
    }

    /// Builder form of [`CategoryBets::push`] for a batch of bets
    pub fn with_bets(mut self, category: BetCategory, amounts_cents: &[i64]) -> Self {
        self.bets[category.index()].extend_from_slice(amounts_cents);
        self
    }

    pub fn get(&self, category: BetCategory) -> &[i64] {
        &self.bets[category.index()]
    }

    pub fn category_total(&self, category: BetCategory) -> Result<i64, MoneyError> {
        self.get(category)
            .iter()
            .try_fold(0, |total, &amount| add_cents(total, amount))
    }

    /// Sum of every bet in every category (cents)
    pub fn total(&self) -> Result<i64, MoneyError> {
        self.bets
            .iter()
            .flatten()
            .try_fold(0, |total, &amount| add_cents(total, amount))
    }

    pub fn bet_count(&self) -> usize {
        self.bets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.iter().all(Vec::is_empty)
    }
}

/// A downline member of the reference agent
///
/// # Example
/// ```
/// use chrono::Utc;
/// use rebate_engine_core::{BetCategory, CategoryBets, Member, MemberActivity, RebateMode};
///
/// let mut member = Member::new("u-100".to_string(), 4, 1, Utc::now(), RebateMode::Normal);
/// assert_eq!(member.total_bet(), 0);
///
/// member.apply_activity(MemberActivity {
///     total_recharge: 50_000,
///     is_first_charge: true,
///     bets: CategoryBets::new().with_bets(BetCategory::Sports, &[10_000, 2_500]),
/// }).unwrap();
/// assert_eq!(member.total_bet(), 12_500); // $125.00 in cents
/// assert!(member.has_recharged());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Backend user identifier
    user_id: String,

    /// Depth in the whole platform hierarchy
    absolute_level: i32,

    /// Depth below the reference agent (absolute - reference absolute)
    relative_level: i32,

    registered_at: DateTime<Utc>,

    rebate_mode: RebateMode,

    /// Paid recharges inside the window (i64 cents)
    total_recharge: i64,

    /// True when every first/second/third-charge record is a first charge
    is_first_charge: bool,

    bets: CategoryBets,

    /// Sum of `bets`, checked when activity is applied (i64 cents)
    total_bet: i64,

    /// False when a backend query for this member failed and its activity
    /// was zeroed
    data_complete: bool,
}

impl Member {
    pub fn new(
        user_id: String,
        absolute_level: i32,
        relative_level: i32,
        registered_at: DateTime<Utc>,
        rebate_mode: RebateMode,
    ) -> Self {
        Self {
            user_id,
            absolute_level,
            relative_level,
            registered_at,
            rebate_mode,
            total_recharge: 0,
            is_first_charge: false,
            bets: CategoryBets::new(),
            total_bet: 0,
            data_complete: true,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn absolute_level(&self) -> i32 {
        self.absolute_level
    }

    pub fn relative_level(&self) -> i32 {
        self.relative_level
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn rebate_mode(&self) -> RebateMode {
        self.rebate_mode
    }

    pub fn total_recharge(&self) -> i64 {
        self.total_recharge
    }

    pub fn is_first_charge(&self) -> bool {
        self.is_first_charge
    }

    pub fn bets(&self) -> &CategoryBets {
        &self.bets
    }

    pub fn total_bet(&self) -> i64 {
        self.total_bet
    }

    pub fn has_recharged(&self) -> bool {
        self.total_recharge > 0
    }

    pub fn data_complete(&self) -> bool {
        self.data_complete
    }

    /// Direct referral of the reference agent
    pub fn is_first_level(&self) -> bool {
        self.relative_level == 1
    }

    /// Replace window activity with freshly aggregated figures
    ///
    /// Fails without touching the member when the bets sum past i64 cents.
    pub fn apply_activity(
        &mut self,
        activity: crate::metrics::MemberActivity,
    ) -> Result<(), MoneyError> {
        self.total_bet = activity.bets.total()?;
        self.total_recharge = activity.total_recharge;
        self.is_first_charge = activity.is_first_charge;
        self.bets = activity.bets;
        self.data_complete = true;
        Ok(())
    }

    /// Zero all activity after a failed query; the member contributes nothing
    pub fn mark_incomplete(&mut self) {
        self.total_recharge = 0;
        self.is_first_charge = false;
        self.bets = CategoryBets::new();
        self.total_bet = 0;
        self.data_complete = false;
    }
}
