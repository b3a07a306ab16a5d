//! Tests for Metrics Aggregation
//!
//! - Only paid recharges inside the window count
//! - First-charge flag requires a non-empty, all-FirstCharge report
//! - Failed members contribute zero and surface as PartialData
//! - Fan-out stays within the concurrency bound and preserves roster order
//! - Cent sums that leave the i64 range fail instead of wrapping

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rebate_engine_core::{
    aggregate_roster, collect_member_activity, resolve_hierarchy, summarize_group, BackendSnapshot,
    BetCategory, BetRecord, DescendantRecord, Diagnostic, FirstChargeRecord, MemberActivity,
    MemberQueryError, MoneyError, QueryKind, RateRow, RebateBackend, RebateMode, RechargeRecord,
    RechargeState, RechargeType, SourceError, TierThresholdRow, TimeWindow,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn in_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

fn after_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 2, 0, 0, 0).unwrap()
}

fn registered() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Snapshot with ROOT at level 1 and the given users at level 2
fn team_snapshot(users: &[&str]) -> BackendSnapshot {
    users.iter().fold(
        BackendSnapshot::new("ROOT").with_descendant("ROOT", 1, registered(), RebateMode::Normal),
        |snapshot, user| snapshot.with_descendant(user, 2, registered(), RebateMode::Normal),
    )
}

// ============================================================================
// Single member collection
// ============================================================================

#[tokio::test]
async fn test_only_paid_recharges_in_window_count() {
    let snapshot = team_snapshot(&["u1"])
        .with_recharge("u1", RechargeState::Paid, 100.25, in_window())
        .with_recharge("u1", RechargeState::Paid, 50.0, in_window())
        .with_recharge("u1", RechargeState::Pending, 999.0, in_window())
        .with_recharge("u1", RechargeState::Failed, 999.0, in_window())
        .with_recharge("u1", RechargeState::Paid, 777.0, after_window());

    let activity = collect_member_activity(&snapshot, "u1", &window()).await.unwrap();

    assert_eq!(activity.total_recharge, 15_025);
}

#[tokio::test]
async fn test_bets_kept_individually_per_category() {
    let snapshot = team_snapshot(&["u1"])
        .with_bet("u1", BetCategory::Sports, 10.10, in_window())
        .with_bet("u1", BetCategory::Sports, 0.29, in_window())
        .with_bet("u1", BetCategory::Lottery, 5.0, in_window())
        .with_bet("u1", BetCategory::Lottery, 5.0, after_window());

    let activity = collect_member_activity(&snapshot, "u1", &window()).await.unwrap();

    assert_eq!(activity.bets.get(BetCategory::Sports), &[1_010, 29]);
    assert_eq!(activity.bets.get(BetCategory::Lottery), &[500]);
    assert!(activity.bets.get(BetCategory::ElectronicGame).is_empty());
    assert_eq!(activity.bets.total(), Ok(1_539));
}

#[tokio::test]
async fn test_first_charge_requires_all_first_charge_records() {
    let snapshot = team_snapshot(&["first", "mixed", "none"])
        .with_first_charge_record("first", RechargeType::FirstCharge)
        .with_first_charge_record("mixed", RechargeType::FirstCharge)
        .with_first_charge_record("mixed", RechargeType::ThirdCharge);

    let w = window();
    let first = collect_member_activity(&snapshot, "first", &w).await.unwrap();
    let mixed = collect_member_activity(&snapshot, "mixed", &w).await.unwrap();
    let none = collect_member_activity(&snapshot, "none", &w).await.unwrap();

    assert!(first.is_first_charge);
    assert!(!mixed.is_first_charge);
    assert!(!none.is_first_charge);
}

#[tokio::test]
async fn test_unavailable_member_reports_failed_query() {
    let snapshot = team_snapshot(&["u1"]).with_unavailable_user("u1");

    let err = collect_member_activity(&snapshot, "u1", &window()).await.unwrap_err();

    assert_eq!(err.query(), QueryKind::Recharges);
}

#[tokio::test]
async fn test_non_finite_amount_is_rejected() {
    let snapshot = team_snapshot(&["u1"]).with_bet("u1", BetCategory::ChessCard, f64::NAN, in_window());

    let err = collect_member_activity(&snapshot, "u1", &window()).await.unwrap_err();

    assert_eq!(err.query(), QueryKind::Bets(BetCategory::ChessCard));
}

// ============================================================================
// Roster fan-out
// ============================================================================

#[tokio::test]
async fn test_failed_member_zeroed_others_aggregated() {
    let snapshot = team_snapshot(&["a", "b", "c"])
        .with_recharge("a", RechargeState::Paid, 10.0, in_window())
        .with_recharge("b", RechargeState::Paid, 20.0, in_window())
        .with_recharge("c", RechargeState::Paid, 30.0, in_window())
        .with_unavailable_user("b");
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();

    let diagnostics = aggregate_roster(Arc::new(snapshot), &mut roster, window(), 2).await;

    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        &diagnostics[0],
        Diagnostic::PartialData { user_id, query: QueryKind::Recharges, .. } if user_id == "b"
    ));

    let team = roster.full_team();
    assert_eq!(team[0].total_recharge(), 1_000);
    assert_eq!(team[1].total_recharge(), 0);
    assert!(!team[1].data_complete());
    assert_eq!(team[2].total_recharge(), 3_000);

    let summary = summarize_group(roster.full_team(), &window()).unwrap();
    assert_eq!(summary.recharging_count, 2);
    assert_eq!(summary.total_recharge, 4_000);
}

#[tokio::test]
async fn test_results_follow_roster_order() {
    let users: Vec<String> = (0..12).map(|i| format!("m{:02}", i)).collect();
    let user_refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let snapshot = users.iter().enumerate().fold(team_snapshot(&user_refs), |s, (i, user)| {
        s.with_bet(user, BetCategory::ElectronicGame, (i + 1) as f64, in_window())
    });
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();

    let diagnostics = aggregate_roster(Arc::new(snapshot), &mut roster, window(), 3).await;

    assert!(diagnostics.is_empty());
    for (i, member) in roster.full_team().iter().enumerate() {
        assert_eq!(member.user_id(), users[i]);
        assert_eq!(member.total_bet(), (i as i64 + 1) * 100);
    }
}

/// Backend that records how many recharge queries overlap
struct CountingBackend {
    inner: BackendSnapshot,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingBackend {
    fn new(inner: BackendSnapshot) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RebateBackend for CountingBackend {
    async fn list_descendants(&self, root_id: &str) -> Result<Vec<DescendantRecord>, SourceError> {
        self.inner.list_descendants(root_id).await
    }

    async fn list_recharges(
        &self,
        user_id: &str,
        state: RechargeState,
        window: &TimeWindow,
    ) -> Result<Vec<RechargeRecord>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.list_recharges(user_id, state, window).await
    }

    async fn list_bets(
        &self,
        user_id: &str,
        category: BetCategory,
        window: &TimeWindow,
    ) -> Result<Vec<BetRecord>, SourceError> {
        self.inner.list_bets(user_id, category, window).await
    }

    async fn list_first_charge_records(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<FirstChargeRecord>, SourceError> {
        self.inner.list_first_charge_records(user_id, window).await
    }

    async fn tier_thresholds(&self) -> Result<Vec<TierThresholdRow>, SourceError> {
        self.inner.tier_thresholds().await
    }

    async fn rate_table(&self) -> Result<Vec<RateRow>, SourceError> {
        self.inner.rate_table().await
    }
}

#[tokio::test]
async fn test_concurrency_bound_respected() {
    let users: Vec<String> = (0..10).map(|i| format!("u{}", i)).collect();
    let user_refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let snapshot = team_snapshot(&user_refs);
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();
    let backend = Arc::new(CountingBackend::new(snapshot));

    let diagnostics = aggregate_roster(backend.clone(), &mut roster, window(), 3).await;

    assert!(diagnostics.is_empty());
    assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(backend.peak.load(Ordering::SeqCst), 3);
}

/// Backend whose worker panics for one user
struct PanickingBackend {
    inner: BackendSnapshot,
    poisoned: &'static str,
}

#[async_trait]
impl RebateBackend for PanickingBackend {
    async fn list_descendants(&self, root_id: &str) -> Result<Vec<DescendantRecord>, SourceError> {
        self.inner.list_descendants(root_id).await
    }

    async fn list_recharges(
        &self,
        user_id: &str,
        state: RechargeState,
        window: &TimeWindow,
    ) -> Result<Vec<RechargeRecord>, SourceError> {
        if user_id == self.poisoned {
            panic!("simulated worker crash");
        }
        self.inner.list_recharges(user_id, state, window).await
    }

    async fn list_bets(
        &self,
        user_id: &str,
        category: BetCategory,
        window: &TimeWindow,
    ) -> Result<Vec<BetRecord>, SourceError> {
        self.inner.list_bets(user_id, category, window).await
    }

    async fn list_first_charge_records(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<FirstChargeRecord>, SourceError> {
        self.inner.list_first_charge_records(user_id, window).await
    }

    async fn tier_thresholds(&self) -> Result<Vec<TierThresholdRow>, SourceError> {
        self.inner.tier_thresholds().await
    }

    async fn rate_table(&self) -> Result<Vec<RateRow>, SourceError> {
        self.inner.rate_table().await
    }
}

#[tokio::test]
async fn test_crashed_worker_reported_as_partial() {
    let snapshot = team_snapshot(&["ok", "boom"])
        .with_recharge("ok", RechargeState::Paid, 5.0, in_window())
        .with_recharge("boom", RechargeState::Paid, 5.0, in_window());
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();
    let backend = Arc::new(PanickingBackend {
        inner: snapshot,
        poisoned: "boom",
    });

    let diagnostics = aggregate_roster(backend, &mut roster, window(), 4).await;

    assert_eq!(
        diagnostics
            .iter()
            .map(|d| (d.code(), d.user_id()))
            .collect::<Vec<_>>(),
        vec![("PartialData", Some("boom"))]
    );
    assert!(matches!(
        diagnostics[0],
        Diagnostic::PartialData { query: QueryKind::Worker, .. }
    ));
    assert_eq!(roster.full_team()[0].total_recharge(), 500);
    assert_eq!(roster.full_team()[1].total_recharge(), 0);
}

#[tokio::test]
async fn test_registration_inside_window_counts_as_new() {
    let snapshot = BackendSnapshot::new("ROOT")
        .with_descendant("ROOT", 1, registered(), RebateMode::Normal)
        .with_descendant("old", 2, registered(), RebateMode::Normal)
        .with_descendant("new", 2, in_window(), RebateMode::Normal)
        .with_descendant("deep", 3, in_window() + Duration::days(1), RebateMode::Normal);
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();
    aggregate_roster(Arc::new(snapshot), &mut roster, window(), 8).await;

    let team = summarize_group(roster.full_team(), &window()).unwrap();
    let first = summarize_group(roster.first_level(), &window()).unwrap();

    assert_eq!((team.registered_count, team.new_registration_count), (3, 2));
    assert_eq!((first.registered_count, first.new_registration_count), (2, 1));
}

// ============================================================================
// Sums beyond the i64 cent range
// ============================================================================

/// Largest bet that still converts exactly: 9e15 cents
const HUGE_AMOUNT: f64 = 90_000_000_000_000.0;

#[tokio::test]
async fn test_overflowing_bet_sum_is_amount_error() {
    // 1,100 x 9e15 cents is past i64::MAX
    let snapshot = (0..1_100).fold(team_snapshot(&["whale"]), |s, _| {
        s.with_bet("whale", BetCategory::ElectronicGame, HUGE_AMOUNT, in_window())
    });

    let err = collect_member_activity(&snapshot, "whale", &window())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        MemberQueryError::Amount {
            query: QueryKind::Bets(BetCategory::ElectronicGame),
            source: MoneyError::SumOverflow,
        }
    );
}

#[tokio::test]
async fn test_bet_sum_overflow_spanning_categories_detected() {
    // Each category alone fits; the member total does not
    let snapshot = BetCategory::ALL
        .iter()
        .fold(team_snapshot(&["whale"]), |s, &category| {
            (0..250).fold(s, |s, _| {
                s.with_bet("whale", category, HUGE_AMOUNT, in_window())
            })
        });

    let err = collect_member_activity(&snapshot, "whale", &window())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MemberQueryError::Amount {
            query: QueryKind::Bets(_),
            source: MoneyError::SumOverflow,
        }
    ));
}

#[tokio::test]
async fn test_overflowing_recharge_sum_is_amount_error() {
    let snapshot = (0..1_100).fold(team_snapshot(&["whale"]), |s, _| {
        s.with_recharge("whale", RechargeState::Paid, HUGE_AMOUNT, in_window())
    });

    let err = collect_member_activity(&snapshot, "whale", &window())
        .await
        .unwrap_err();

    assert_eq!(err.query(), QueryKind::Recharges);
    assert!(matches!(
        err,
        MemberQueryError::Amount { source: MoneyError::SumOverflow, .. }
    ));
}

#[tokio::test]
async fn test_overflowing_member_is_zeroed_as_partial_data() {
    let snapshot = (0..1_100).fold(team_snapshot(&["whale", "minnow"]), |s, _| {
        s.with_bet("whale", BetCategory::ElectronicGame, HUGE_AMOUNT, in_window())
    })
    .with_bet("minnow", BetCategory::Sports, 12.5, in_window());
    let (mut roster, _) = resolve_hierarchy("ROOT", snapshot.descendants()).unwrap();

    let diagnostics = aggregate_roster(Arc::new(snapshot), &mut roster, window(), 2).await;

    assert_eq!(diagnostics.len(), 1);
    assert!(matches!(
        &diagnostics[0],
        Diagnostic::PartialData { user_id, query: QueryKind::Bets(BetCategory::ElectronicGame), .. }
            if user_id == "whale"
    ));
    let whale = roster
        .full_team()
        .iter()
        .find(|m| m.user_id() == "whale")
        .unwrap();
    assert!(!whale.data_complete());
    assert_eq!(whale.total_bet(), 0);

    let summary = summarize_group(roster.full_team(), &window()).unwrap();
    assert_eq!(summary.total_bet, 1_250);
    assert_eq!(summary.betting_count, 1);
}

// ============================================================================
// Members without activity
// ============================================================================

/// Shared buffer for formatted log output
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn test_member_without_activity_is_logged_and_zero() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // Only out-of-window records for "idle"
    let snapshot = team_snapshot(&["idle", "busy"])
        .with_recharge("idle", RechargeState::Paid, 50.0, after_window())
        .with_bet("idle", BetCategory::Sports, 5.0, after_window())
        .with_bet("busy", BetCategory::Sports, 5.0, in_window());

    let idle = collect_member_activity(&snapshot, "idle", &window()).await.unwrap();
    assert_eq!(idle, MemberActivity::default());
    let quiet = logs.contents();
    assert!(quiet.contains("member has no recharges or bets in window"));
    assert!(quiet.contains("idle"));

    let before = logs.contents().len();
    collect_member_activity(&snapshot, "busy", &window()).await.unwrap();
    assert!(!logs.contents()[before..].contains("member has no recharges or bets"));
}
