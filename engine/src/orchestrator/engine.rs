//! Rebate Engine - five-stage pipeline
//!
//! ```text
//! For each run:
//! 0. Load and validate tier thresholds + rate table   (abort on error)
//! 1. Hierarchy: roster relative to the reference agent
//! 2. Metrics: fan out member queries, join (barrier)
//! 3. Tier: classify team tier from team summary
//! 4. Rates: per member, override precedence -> rate vector
//! 5. Commission: per member, accumulate into level buckets
//! ```
//!
//! Stages run strictly in order and never feed back. All run state lives in
//! a fresh [`ComputationContext`]; nothing is shared between runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rebate_engine_core::{BackendSnapshot, EngineConfig, RebateEngine, TimeWindow};
//!
//! let snapshot = BackendSnapshot::from_json_str(&std::fs::read_to_string("input.json")?)?;
//! let engine = RebateEngine::new(EngineConfig::default(), Arc::new(snapshot))?;
//!
//! let report = engine.run("AGENT_42", window).await?;
//! for (level, total) in report.level_totals.iter() {
//!     println!("level {}: {}", level, total);
//! }
//! ```

use crate::commission::{member_commission, LevelRebateTotals};
use crate::core::window::{TimeWindow, WindowError};
use crate::hierarchy::{resolve_hierarchy, HierarchyError, Roster};
use crate::metrics::{aggregate_roster, summarize_group};
use crate::models::diagnostic::Diagnostic;
use crate::models::report::{GroupSummary, MemberBreakdown, RebateReport};
use crate::orchestrator::config::{ConfigError, EngineConfig};
use crate::rates::{resolve_target_tier, RateError, RateSchedule};
use crate::source::{RebateBackend, SourceError};
use crate::tier::{classify_tier, validate_thresholds, TierOutcome, TierTableError, TierThreshold};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Tables or settings unusable for a run
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error(transparent)]
    Engine(#[from] ConfigError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("Tier threshold table: {0}")]
    TierTable(TierTableError),

    #[error("Rate table: {0}")]
    RateTable(#[from] RateError),
}

/// A contract the engine relies on does not hold
#[derive(Debug, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("Tier threshold table: {0}")]
    TierOrdering(TierTableError),

    #[error("Reference agent {reference_id} missing from its own descendant listing")]
    ReferenceMissing { reference_id: String },

    #[error("Member {user_id} at relative level {level} has no rebate bucket")]
    LevelOutOfRange { user_id: String, level: i32 },

    /// Every member fits in i64 cents but the group sum does not
    #[error("{group} summary exceeds the i64 cent range")]
    SummaryOverflow { group: &'static str },
}

/// Run-aborting engine errors
///
/// Non-fatal conditions never surface here; they are reported as
/// [`Diagnostic`]s on a complete report.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    /// A backend read every member depends on failed
    #[error("Could not load {what}: {source}")]
    Unavailable {
        what: &'static str,
        source: SourceError,
    },
}

impl From<TierTableError> for EngineError {
    fn from(err: TierTableError) -> Self {
        if err.is_invariant_violation() {
            InvariantViolation::TierOrdering(err).into()
        } else {
            ConfigurationError::TierTable(err).into()
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::Engine(err).into()
    }
}

impl From<WindowError> for EngineError {
    fn from(err: WindowError) -> Self {
        ConfigurationError::Window(err).into()
    }
}

impl From<RateError> for EngineError {
    fn from(err: RateError) -> Self {
        ConfigurationError::RateTable(err).into()
    }
}

impl EngineError {
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EngineError::InvariantViolation(_))
    }
}

// ============================================================================
// Computation Context
// ============================================================================

/// All mutable state of one run
///
/// Created at the start of [`RebateEngine::run`] and consumed into the
/// report at the end. The level accumulators and summaries live here and
/// nowhere else.
#[derive(Debug)]
pub struct ComputationContext {
    run_id: Uuid,
    reference_id: String,
    window: TimeWindow,
    strict_levels: bool,

    thresholds: Vec<TierThreshold>,
    schedule: RateSchedule,

    /// None when the reference agent has no downline
    roster: Option<Roster>,

    team_summary: GroupSummary,
    first_level_summary: GroupSummary,
    team_tier: TierOutcome,
    level_totals: LevelRebateTotals,
    members: Vec<MemberBreakdown>,
    diagnostics: Vec<Diagnostic>,
}

impl ComputationContext {
    pub fn new(
        reference_id: &str,
        window: TimeWindow,
        strict_levels: bool,
        thresholds: Vec<TierThreshold>,
        schedule: RateSchedule,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            reference_id: reference_id.to_string(),
            window,
            strict_levels,
            thresholds,
            schedule,
            roster: None,
            team_summary: GroupSummary::default(),
            first_level_summary: GroupSummary::default(),
            team_tier: TierOutcome::NoActivity,
            level_totals: LevelRebateTotals::new(),
            members: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn level_totals(&self) -> &LevelRebateTotals {
        &self.level_totals
    }

    pub fn team_tier(&self) -> TierOutcome {
        self.team_tier
    }

    /// Stage 1: attribute levels relative to the reference agent
    pub fn resolve_roster(
        &mut self,
        descendants: &[crate::source::DescendantRecord],
    ) -> Result<(), EngineError> {
        match resolve_hierarchy(&self.reference_id, descendants) {
            Ok((roster, diagnostics)) => {
                info!(
                    members = roster.len(),
                    reference_level = roster.reference_level(),
                    "roster resolved"
                );
                self.diagnostics.extend(diagnostics);
                self.roster = Some(roster);
                Ok(())
            }
            Err(HierarchyError::NoDownline { reference_id }) => {
                warn!(reference_id = %reference_id, "no downline, reporting zeros");
                self.diagnostics.push(Diagnostic::NoDownline { reference_id });
                Ok(())
            }
            Err(HierarchyError::ReferenceMissing { reference_id }) => {
                Err(InvariantViolation::ReferenceMissing { reference_id }.into())
            }
        }
    }

    /// Stage 2b: team and first-level summaries (after the metrics barrier)
    pub fn summarize(&mut self) -> Result<(), EngineError> {
        if let Some(roster) = &self.roster {
            self.team_summary = summarize_group(roster.full_team(), &self.window)
                .map_err(|_| InvariantViolation::SummaryOverflow { group: "team" })?;
            self.first_level_summary = summarize_group(roster.first_level(), &self.window)
                .map_err(|_| InvariantViolation::SummaryOverflow {
                    group: "first level",
                })?;
        }
        Ok(())
    }

    /// Stage 3: classify the team tier
    pub fn classify(&mut self) -> Result<TierOutcome, EngineError> {
        let metrics = self.team_summary.team_metrics();
        let outcome = classify_tier(&metrics, &self.thresholds);

        match outcome {
            TierOutcome::Misconfigured => return Err(TierTableError::Empty.into()),
            TierOutcome::NoActivity => self.diagnostics.push(Diagnostic::NoActivity),
            TierOutcome::BelowFloor => self.diagnostics.push(Diagnostic::BelowFloor {
                recharging_count: metrics.recharging_count,
                total_recharge: metrics.total_recharge,
                total_bet: metrics.total_bet,
            }),
            TierOutcome::Qualified(_) => {}
        }

        info!(
            team_tier = outcome.code(),
            recharging = metrics.recharging_count,
            recharge = metrics.total_recharge,
            bet = metrics.total_bet,
            "team tier classified"
        );
        self.team_tier = outcome;
        Ok(outcome)
    }

    /// Stages 4 + 5: resolve each member's rates and accumulate commission
    pub fn compute_commissions(&mut self) -> Result<(), EngineError> {
        let Some(roster) = &self.roster else {
            return Ok(());
        };

        for member in roster.full_team() {
            let applied_tier = resolve_target_tier(member.rebate_mode(), self.team_tier);
            let rates = self.schedule.rates_for_outcome(applied_tier)?;
            let commission = member_commission(member.bets(), &rates);

            let bucketed = match self
                .level_totals
                .add(member.relative_level(), commission.total())
            {
                Ok(()) => true,
                Err(err) if self.strict_levels => {
                    return Err(InvariantViolation::LevelOutOfRange {
                        user_id: member.user_id().to_string(),
                        level: err.level,
                    }
                    .into());
                }
                Err(err) => {
                    warn!(user_id = member.user_id(), level = err.level, "member outside rebate levels");
                    self.diagnostics.push(Diagnostic::LevelOutOfRange {
                        user_id: member.user_id().to_string(),
                        relative_level: err.level,
                    });
                    false
                }
            };

            self.members.push(MemberBreakdown {
                user_id: member.user_id().to_string(),
                relative_level: member.relative_level(),
                rebate_mode: member.rebate_mode(),
                applied_tier,
                rates,
                total_recharge: member.total_recharge(),
                total_bet: member.total_bet(),
                is_first_charge: member.is_first_charge(),
                commission,
                bucketed,
                data_complete: member.data_complete(),
            });
        }

        info!(total = %self.level_totals.total(), "commission accumulated");
        Ok(())
    }

    /// Consume the context into the report
    pub fn into_report(self, input_fingerprint: Option<String>) -> RebateReport {
        RebateReport {
            run_id: self.run_id,
            reference_id: self.reference_id,
            window: self.window,
            input_fingerprint,
            team_summary: self.team_summary,
            first_level_summary: self.first_level_summary,
            team_tier: self.team_tier,
            level_totals: self.level_totals,
            members: self.members,
            diagnostics: self.diagnostics,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Runs the rebate pipeline against a backend
pub struct RebateEngine {
    config: EngineConfig,
    backend: Arc<dyn RebateBackend>,
}

impl RebateEngine {
    pub fn new(config: EngineConfig, backend: Arc<dyn RebateBackend>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute the rebate report for `reference_id` over `window`
    ///
    /// # Errors
    ///
    /// Aborts with [`EngineError`] only for configuration problems, broken
    /// invariants, or when the tables or roster cannot be read at all. Any
    /// per-member failure is a diagnostic on the returned report.
    pub async fn run(
        &self,
        reference_id: &str,
        window: TimeWindow,
    ) -> Result<RebateReport, EngineError> {
        let (thresholds, schedule) = self.load_tables().await?;
        let mut ctx = ComputationContext::new(
            reference_id,
            window,
            self.config.strict_levels,
            thresholds,
            schedule,
        );
        let span = info_span!("rebate_run", run_id = %ctx.run_id(), reference_id);

        async move {
            info!(start = %window.start(), end = %window.end(), "run started");

            let descendants = self
                .backend
                .list_descendants(reference_id)
                .await
                .map_err(|source| EngineError::Unavailable {
                    what: "descendant listing",
                    source,
                })?;
            ctx.resolve_roster(&descendants)?;

            if let Some(roster) = ctx.roster.as_mut() {
                let partial = aggregate_roster(
                    Arc::clone(&self.backend),
                    roster,
                    window,
                    self.config.max_concurrent_members,
                )
                .await;
                ctx.diagnostics.extend(partial);
            }

            ctx.summarize()?;
            ctx.classify()?;
            ctx.compute_commissions()?;

            info!(diagnostics = ctx.diagnostics().len(), "run finished");
            Ok(ctx.into_report(self.backend.input_fingerprint()))
        }
        .instrument(span)
        .await
    }

    async fn load_tables(&self) -> Result<(Vec<TierThreshold>, RateSchedule), EngineError> {
        let rows = self
            .backend
            .tier_thresholds()
            .await
            .map_err(|source| EngineError::Unavailable {
                what: "tier thresholds",
                source,
            })?;
        let thresholds = rows
            .iter()
            .map(TierThreshold::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        validate_thresholds(&thresholds)?;

        let rate_rows = self
            .backend
            .rate_table()
            .await
            .map_err(|source| EngineError::Unavailable {
                what: "rate table",
                source,
            })?;
        let schedule = RateSchedule::from_rows(&rate_rows)?;

        Ok((thresholds, schedule))
    }
}
