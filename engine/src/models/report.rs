//! Rebate report - the engine's output value
//!
//! A plain, serialisable value for a reporting/comparison layer. Monetary
//! fields are i64 cents except commission figures, which stay in exact
//! micro-cents until [`RebateReport::level_totals_cents`] or a
//! `to_cents()` call rounds them.

use crate::commission::{LevelRebateTotals, MemberCommission, MAX_REBATE_LEVEL};
use crate::core::money::MicroCents;
use crate::core::window::TimeWindow;
use crate::models::diagnostic::Diagnostic;
use crate::models::member::RebateMode;
use crate::rates::CategoryRates;
use crate::tier::{TeamMetrics, TierOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregated counts and amounts for a group of members
///
/// Used for both the whole team and the first level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Members in the group
    pub registered_count: u64,
    /// Members whose registration falls inside the window
    pub new_registration_count: u64,
    /// Members with a paid recharge in the window
    pub recharging_count: u64,
    pub first_charge_count: u64,
    /// Members with at least one bet in the window
    pub betting_count: u64,
    /// Paid recharges (cents)
    pub total_recharge: i64,
    /// Bets across all categories (cents)
    pub total_bet: i64,
}

impl GroupSummary {
    /// Inputs for tier classification
    pub fn team_metrics(&self) -> TeamMetrics {
        TeamMetrics {
            recharging_count: self.recharging_count,
            total_recharge: self.total_recharge,
            total_bet: self.total_bet,
        }
    }
}

/// One member's contribution to the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBreakdown {
    pub user_id: String,
    pub relative_level: i32,
    pub rebate_mode: RebateMode,
    /// Tier whose rates were applied after override precedence
    pub applied_tier: TierOutcome,
    pub rates: CategoryRates,
    pub total_recharge: i64,
    pub total_bet: i64,
    pub is_first_charge: bool,
    pub commission: MemberCommission,
    /// False when the member's commission is outside the level buckets
    pub bucketed: bool,
    /// False when a query failed and the member was zeroed
    pub data_complete: bool,
}

/// Complete result of one computation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebateReport {
    pub run_id: Uuid,
    pub reference_id: String,
    pub window: TimeWindow,
    /// Digest of the backend input, when the backend is a fixed snapshot
    pub input_fingerprint: Option<String>,
    pub team_summary: GroupSummary,
    pub first_level_summary: GroupSummary,
    pub team_tier: TierOutcome,
    pub level_totals: LevelRebateTotals,
    pub members: Vec<MemberBreakdown>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RebateReport {
    /// Per-level totals rounded to cents (index 0 = level 1)
    pub fn level_totals_cents(&self) -> [i64; MAX_REBATE_LEVEL as usize] {
        self.level_totals.to_cents()
    }

    /// Sum of all level buckets, exact
    pub fn total_commission(&self) -> MicroCents {
        self.level_totals.total()
    }

    pub fn member(&self, user_id: &str) -> Option<&MemberBreakdown> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn has_diagnostic(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code() == code)
    }

    /// True when every member's data was collected
    pub fn is_data_complete(&self) -> bool {
        self.members.iter().all(|m| m.data_complete)
    }
}
