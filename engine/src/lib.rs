//! Rebate Engine Core - Multi-Level Commission Verification
//!
//! Independently recomputes the commission a referral network should earn
//! from downline wagering, so a production backend's own figure can be
//! checked against it.
//!
//! # Architecture
//!
//! - **core**: Money arithmetic and time windows
//! - **models**: Domain types (Member, Diagnostic, RebateReport)
//! - **source**: Backend capability trait and replayable input snapshots
//! - **hierarchy**: Level attribution relative to a reference agent
//! - **metrics**: Per-member recharge/bet aggregation (bounded fan-out)
//! - **tier**: Team tier classification from threshold tables
//! - **rates**: Per-category rate resolution with member overrides
//! - **commission**: Commission calculation and per-level totals
//! - **orchestrator**: The five-stage pipeline and per-run context
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents); commission accumulates in i128 micro-cents
//! 2. Rounding to cents happens only when a figure is reported
//! 3. No state survives between runs: every run owns a fresh `ComputationContext`

pub mod commission;
pub mod core;
pub mod hierarchy;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod rates;
pub mod source;
pub mod tier;

// Re-exports for convenience
pub use crate::core::money::{format_cents, MicroCents, MoneyError};
pub use crate::core::window::{TimeWindow, WindowError};
pub use commission::{member_commission, LevelOutOfRange, LevelRebateTotals, MemberCommission};
pub use hierarchy::{resolve_hierarchy, HierarchyError, Roster};
pub use metrics::{aggregate_roster, collect_member_activity, summarize_group, MemberActivity, MemberQueryError};
pub use models::{
    diagnostic::{Diagnostic, QueryKind},
    member::{BetCategory, CategoryBets, Member, RebateMode},
    report::{GroupSummary, MemberBreakdown, RebateReport},
};
pub use orchestrator::{
    ComputationContext, ConfigError, ConfigurationError, EngineConfig, EngineError,
    InvariantViolation, RebateEngine,
};
pub use rates::{resolve_target_tier, CategoryRates, RateError, RateSchedule};
pub use source::{
    snapshot::{snapshot_fingerprint, BackendSnapshot},
    BetRecord, DescendantRecord, FirstChargeRecord, RateRow, RebateBackend, RechargeRecord,
    RechargeState, RechargeType, SourceError, TierThresholdRow,
};
pub use tier::{classify_tier, validate_thresholds, TeamMetrics, TierOutcome, TierTableError, TierThreshold};
