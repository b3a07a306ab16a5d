//! Snapshot - Replayable Backend Input
//!
//! Captures everything a run reads from the backend so the computation can
//! be repeated offline and compared run against run.
//!
//! # Critical Invariants
//!
//! - **Replay fidelity**: records are returned exactly as captured; window
//!   filtering stays the engine's job
//! - **Stable fingerprint**: identical snapshots hash identically regardless
//!   of map iteration order

use crate::core::window::TimeWindow;
use crate::models::member::BetCategory;
use crate::source::{
    BetRecord, DescendantRecord, FirstChargeRecord, RateRow, RebateBackend, RechargeRecord,
    RechargeState, RechargeType, SourceError, TierThresholdRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Recharge as captured, with its order state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRecharge {
    pub state: RechargeState,
    #[serde(flatten)]
    pub record: RechargeRecord,
}

/// Captured activity for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserActivitySnapshot {
    #[serde(default)]
    pub recharges: Vec<CapturedRecharge>,
    #[serde(default)]
    pub bets: BTreeMap<BetCategory, Vec<BetRecord>>,
    #[serde(default)]
    pub first_charge_records: Vec<FirstChargeRecord>,
}

/// Complete backend input for one reference agent
///
/// # Example
/// ```
/// use chrono::Utc;
/// use rebate_engine_core::{BackendSnapshot, BetCategory, RebateMode};
///
/// let now = Utc::now();
/// let snapshot = BackendSnapshot::new("ROOT")
///     .with_descendant("ROOT", 2, now, RebateMode::Normal)
///     .with_descendant("u1", 3, now, RebateMode::Normal)
///     .with_bet("u1", BetCategory::Sports, 25.0, now);
///
/// assert_eq!(snapshot.descendants().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub root_id: String,
    #[serde(default)]
    pub descendants: Vec<DescendantRecord>,
    #[serde(default)]
    pub activity: BTreeMap<String, UserActivitySnapshot>,
    #[serde(default)]
    pub tier_thresholds: Vec<TierThresholdRow>,
    #[serde(default)]
    pub rate_table: Vec<RateRow>,
    /// Users whose activity queries failed when the snapshot was captured
    #[serde(default)]
    pub unavailable_users: BTreeSet<String>,
}

impl BackendSnapshot {
    pub fn new(root_id: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        serde_json::from_str(json).map_err(|e| SourceError::Serialization(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, SourceError> {
        serde_json::to_string_pretty(self).map_err(|e| SourceError::Serialization(e.to_string()))
    }

    pub fn descendants(&self) -> &[DescendantRecord] {
        &self.descendants
    }

    pub fn with_descendant(
        mut self,
        user_id: &str,
        absolute_level: i32,
        registered_at: DateTime<Utc>,
        rebate_mode: crate::models::member::RebateMode,
    ) -> Self {
        self.descendants.push(DescendantRecord {
            user_id: user_id.to_string(),
            absolute_level,
            registered_at,
            rebate_mode,
        });
        self
    }

    pub fn with_recharge(
        mut self,
        user_id: &str,
        state: RechargeState,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        self.activity_mut(user_id).recharges.push(CapturedRecharge {
            state,
            record: RechargeRecord { amount, timestamp },
        });
        self
    }

    pub fn with_bet(
        mut self,
        user_id: &str,
        category: BetCategory,
        bet_amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        self.activity_mut(user_id)
            .bets
            .entry(category)
            .or_default()
            .push(BetRecord {
                bet_amount,
                timestamp,
            });
        self
    }

    pub fn with_first_charge_record(mut self, user_id: &str, recharge_type: RechargeType) -> Self {
        self.activity_mut(user_id)
            .first_charge_records
            .push(FirstChargeRecord { recharge_type });
        self
    }

    pub fn with_tier_thresholds(mut self, rows: Vec<TierThresholdRow>) -> Self {
        self.tier_thresholds = rows;
        self
    }

    pub fn with_rate_table(mut self, rows: Vec<RateRow>) -> Self {
        self.rate_table = rows;
        self
    }

    pub fn with_unavailable_user(mut self, user_id: &str) -> Self {
        self.unavailable_users.insert(user_id.to_string());
        self
    }

    fn activity_mut(&mut self, user_id: &str) -> &mut UserActivitySnapshot {
        self.activity.entry(user_id.to_string()).or_default()
    }

    fn activity_for(&self, user_id: &str) -> Result<Option<&UserActivitySnapshot>, SourceError> {
        if self.unavailable_users.contains(user_id) {
            return Err(SourceError::Request(format!(
                "activity for {} unavailable in snapshot",
                user_id
            )));
        }
        Ok(self.activity.get(user_id))
    }
}

#[async_trait]
impl RebateBackend for BackendSnapshot {
    async fn list_descendants(&self, root_id: &str) -> Result<Vec<DescendantRecord>, SourceError> {
        if root_id != self.root_id {
            return Ok(Vec::new());
        }
        Ok(self.descendants.clone())
    }

    async fn list_recharges(
        &self,
        user_id: &str,
        state: RechargeState,
        _window: &TimeWindow,
    ) -> Result<Vec<RechargeRecord>, SourceError> {
        Ok(self
            .activity_for(user_id)?
            .map(|activity| {
                activity
                    .recharges
                    .iter()
                    .filter(|r| r.state == state)
                    .map(|r| r.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_bets(
        &self,
        user_id: &str,
        category: BetCategory,
        _window: &TimeWindow,
    ) -> Result<Vec<BetRecord>, SourceError> {
        Ok(self
            .activity_for(user_id)?
            .and_then(|activity| activity.bets.get(&category))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_first_charge_records(
        &self,
        user_id: &str,
        _window: &TimeWindow,
    ) -> Result<Vec<FirstChargeRecord>, SourceError> {
        Ok(self
            .activity_for(user_id)?
            .map(|activity| activity.first_charge_records.clone())
            .unwrap_or_default())
    }

    async fn tier_thresholds(&self) -> Result<Vec<TierThresholdRow>, SourceError> {
        Ok(self.tier_thresholds.clone())
    }

    async fn rate_table(&self) -> Result<Vec<RateRow>, SourceError> {
        Ok(self.rate_table.clone())
    }

    fn input_fingerprint(&self) -> Option<String> {
        snapshot_fingerprint(self).ok()
    }
}

/// Compute deterministic SHA256 hash of a snapshot
///
/// Uses canonical JSON serialization with sorted keys so the digest does
/// not depend on map iteration order.
pub fn snapshot_fingerprint<T: Serialize>(snapshot: &T) -> Result<String, SourceError> {
    use serde_json::Value;

    let value = serde_json::to_value(snapshot)
        .map_err(|e| SourceError::Serialization(format!("Snapshot serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SourceError::Serialization(format!("Snapshot serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
