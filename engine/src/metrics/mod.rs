//! Metrics Aggregation
//!
//! Fills every roster member with its window activity:
//! - paid recharge total (cents)
//! - first-charge flag from the first/second/third-charge report
//! - individual bet amounts for each of the five categories
//!
//! # Fan-out
//!
//! ```text
//! JoinSet::spawn(collect_member_activity, member_i) × N
//!   Semaphore(max_concurrent) bounds in-flight members
//! join_next() until empty   <- barrier: classification waits for all
//! ```
//!
//! ## Partial failure policy
//!
//! A member whose query fails (or whose worker dies) contributes zero and is
//! reported as `PartialData`. The run continues with everyone else.

use crate::core::money::{add_cents, to_cents, MoneyError};
use crate::core::window::TimeWindow;
use crate::hierarchy::Roster;
use crate::models::diagnostic::{Diagnostic, QueryKind};
use crate::models::member::{BetCategory, CategoryBets, Member};
use crate::models::report::GroupSummary;
use crate::source::{RebateBackend, RechargeState, RechargeType, SourceError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Window activity for one member, ready to apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberActivity {
    /// Paid recharges in the window (i64 cents)
    pub total_recharge: i64,
    pub is_first_charge: bool,
    pub bets: CategoryBets,
}

/// A member's activity could not be collected
#[derive(Debug, Error, PartialEq)]
pub enum MemberQueryError {
    #[error("{query} query failed: {source}")]
    Backend { query: QueryKind, source: SourceError },

    #[error("{query} returned an unusable amount: {source}")]
    Amount { query: QueryKind, source: MoneyError },
}

impl MemberQueryError {
    pub fn query(&self) -> QueryKind {
        match self {
            MemberQueryError::Backend { query, .. } | MemberQueryError::Amount { query, .. } => {
                *query
            }
        }
    }

    fn reason(&self) -> String {
        match self {
            MemberQueryError::Backend { source, .. } => source.to_string(),
            MemberQueryError::Amount { source, .. } => source.to_string(),
        }
    }
}

fn within_window(window: &TimeWindow, ts: DateTime<Utc>, user_id: &str, query: QueryKind) -> bool {
    let inside = window.contains(ts);
    if !inside {
        debug!(user_id, %query, timestamp = %ts, "ignoring record outside window");
    }
    inside
}

/// Query and aggregate one member's activity
pub async fn collect_member_activity(
    backend: &dyn RebateBackend,
    user_id: &str,
    window: &TimeWindow,
) -> Result<MemberActivity, MemberQueryError> {
    let mut activity = MemberActivity::default();

    let query = QueryKind::Recharges;
    let recharges = backend
        .list_recharges(user_id, RechargeState::Paid, window)
        .await
        .map_err(|source| MemberQueryError::Backend { query, source })?;
    for recharge in recharges
        .iter()
        .filter(|r| within_window(window, r.timestamp, user_id, query))
    {
        activity.total_recharge = to_cents(recharge.amount)
            .and_then(|cents| add_cents(activity.total_recharge, cents))
            .map_err(|source| MemberQueryError::Amount { query, source })?;
    }

    let query = QueryKind::FirstChargeRecords;
    let charge_records = backend
        .list_first_charge_records(user_id, window)
        .await
        .map_err(|source| MemberQueryError::Backend { query, source })?;
    activity.is_first_charge = !charge_records.is_empty()
        && charge_records
            .iter()
            .all(|r| r.recharge_type == RechargeType::FirstCharge);

    // Running sum so an overflowing member fails here, not in the team totals
    let mut total_bet: i64 = 0;
    for category in BetCategory::ALL {
        let query = QueryKind::Bets(category);
        let bets = backend
            .list_bets(user_id, category, window)
            .await
            .map_err(|source| MemberQueryError::Backend { query, source })?;
        for bet in bets
            .iter()
            .filter(|b| within_window(window, b.timestamp, user_id, query))
        {
            let cents = to_cents(bet.bet_amount)
                .and_then(|cents| {
                    total_bet = add_cents(total_bet, cents)?;
                    Ok(cents)
                })
                .map_err(|source| MemberQueryError::Amount { query, source })?;
            activity.bets.push(category, cents);
        }
    }

    if activity.total_recharge == 0 && activity.bets.is_empty() {
        debug!(user_id, "member has no recharges or bets in window");
    }

    Ok(activity)
}

/// Aggregate activity for every roster member
///
/// At most `max_concurrent` members are queried at once. Returns only after
/// every worker has finished; results are applied in roster order.
pub async fn aggregate_roster(
    backend: Arc<dyn RebateBackend>,
    roster: &mut Roster,
    window: TimeWindow,
    max_concurrent: usize,
) -> Vec<Diagnostic> {
    let member_count = roster.len();
    info!(members = member_count, max_concurrent, "aggregating member metrics");

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut join_set: JoinSet<(usize, Result<MemberActivity, MemberQueryError>)> = JoinSet::new();

    for (index, member) in roster.full_team().iter().enumerate() {
        let backend = Arc::clone(&backend);
        let semaphore = Arc::clone(&semaphore);
        let user_id = member.user_id().to_string();

        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => collect_member_activity(backend.as_ref(), &user_id, &window).await,
                Err(_) => Err(MemberQueryError::Backend {
                    query: QueryKind::Worker,
                    source: SourceError::Request("worker pool closed".to_string()),
                }),
            };
            (index, result)
        });
    }

    let mut outcomes: Vec<Option<Result<MemberActivity, MemberQueryError>>> =
        (0..member_count).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => outcomes[index] = Some(result),
            Err(e) => {
                // Panic in a worker; its member is zeroed below
                warn!(error = %e, "member aggregation worker failed");
            }
        }
    }

    let mut diagnostics = Vec::new();
    for (member, outcome) in roster.members_mut().iter_mut().zip(outcomes) {
        let outcome = outcome.map(|result| {
            result.and_then(|activity| {
                member
                    .apply_activity(activity)
                    .map_err(|source| MemberQueryError::Amount {
                        query: QueryKind::Worker,
                        source,
                    })
            })
        });
        match outcome {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!(user_id = member.user_id(), error = %err, "member contributes zero");
                member.mark_incomplete();
                diagnostics.push(Diagnostic::PartialData {
                    user_id: member.user_id().to_string(),
                    query: err.query(),
                    reason: err.reason(),
                });
            }
            None => {
                warn!(user_id = member.user_id(), "member worker produced no result");
                member.mark_incomplete();
                diagnostics.push(Diagnostic::PartialData {
                    user_id: member.user_id().to_string(),
                    query: QueryKind::Worker,
                    reason: "worker ended without a result".to_string(),
                });
            }
        }
    }

    info!(
        members = member_count,
        partial = diagnostics.len(),
        "member metrics aggregated"
    );
    diagnostics
}

/// Counts and sums over a group of members
///
/// Fails with [`MoneyError::SumOverflow`] when a cent total leaves the i64 range.
pub fn summarize_group<'a>(
    members: impl IntoIterator<Item = &'a Member>,
    window: &TimeWindow,
) -> Result<GroupSummary, MoneyError> {
    let mut summary = GroupSummary::default();
    for member in members {
        summary.registered_count += 1;
        if window.contains(member.registered_at()) {
            summary.new_registration_count += 1;
        }
        if member.has_recharged() {
            summary.recharging_count += 1;
        }
        if member.is_first_charge() {
            summary.first_charge_count += 1;
        }
        let bet = member.total_bet();
        if bet > 0 {
            summary.betting_count += 1;
        }
        summary.total_recharge = add_cents(summary.total_recharge, member.total_recharge())?;
        summary.total_bet = add_cents(summary.total_bet, bet)?;
    }
    Ok(summary)
}
