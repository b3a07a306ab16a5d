//! Backend Capabilities
//!
//! Everything the engine reads comes through [`RebateBackend`]. Transport,
//! authentication, pacing and retries belong to the implementor; the engine
//! only sees records or a [`SourceError`].
//!
//! Amounts in records are decimal currency units as the backend reports
//! them. The engine converts them to integer cents on ingestion.

pub mod snapshot;

use crate::core::window::TimeWindow;
use crate::models::member::{BetCategory, RebateMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a backend implementation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Backend request failed: {0}")]
    Request(String),

    #[error("Backend returned malformed data: {0}")]
    Malformed(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Recharge order state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RechargeState {
    Pending,
    Paid,
    Failed,
}

/// Classification in the first/second/third-charge report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RechargeType {
    FirstCharge,
    SecondCharge,
    ThirdCharge,
}

/// Entry of the reference agent's downline listing
///
/// The listing includes the reference agent itself; its absolute level is
/// the origin for relative levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescendantRecord {
    pub user_id: String,
    pub absolute_level: i32,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub rebate_mode: RebateMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RechargeRecord {
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet_amount: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstChargeRecord {
    pub recharge_type: RechargeType,
}

/// Tier threshold row as configured in the backend (decimal amounts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThresholdRow {
    pub tier: i32,
    pub min_recharge_count: u64,
    pub min_recharge_amount: f64,
    pub min_bet_amount: f64,
}

/// Rate table row (percentages); each tier group ends with an aggregate row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub tier: i32,
    pub rate_electronic_game: f64,
    pub rate_live_casino: f64,
    pub rate_sports: f64,
    pub rate_lottery: f64,
    pub rate_chess_card: f64,
}

/// Read-only view of the production backend
#[async_trait]
pub trait RebateBackend: Send + Sync {
    /// The root's whole downline, the root included
    async fn list_descendants(&self, root_id: &str) -> Result<Vec<DescendantRecord>, SourceError>;

    async fn list_recharges(
        &self,
        user_id: &str,
        state: RechargeState,
        window: &TimeWindow,
    ) -> Result<Vec<RechargeRecord>, SourceError>;

    async fn list_bets(
        &self,
        user_id: &str,
        category: BetCategory,
        window: &TimeWindow,
    ) -> Result<Vec<BetRecord>, SourceError>;

    async fn list_first_charge_records(
        &self,
        user_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<FirstChargeRecord>, SourceError>;

    /// Thresholds ordered ascending by tier
    async fn tier_thresholds(&self) -> Result<Vec<TierThresholdRow>, SourceError>;

    async fn rate_table(&self) -> Result<Vec<RateRow>, SourceError>;

    /// Stable digest of the backend's data, when it is a fixed snapshot
    fn input_fingerprint(&self) -> Option<String> {
        None
    }
}
