//! Run diagnostics
//!
//! Non-fatal conditions observed while computing a report. A report with
//! diagnostics is still complete: every member either contributed its full
//! activity or was zeroed and listed here.
//!
//! # Diagnostic Types
//!
//! - **NoDownline**: reference agent has no descendants (all-zero report)
//! - **NoActivity**: team has no recharges and no bets
//! - **BelowFloor**: team has activity but qualifies for no tier
//! - **PartialData**: a member's query failed; member contributes zero
//! - **LevelOutOfRange**: member deeper than the last rebate level
//! - **NotDescendant**: backend returned a member at or above the reference
//! - **DuplicateMember**: backend returned the same user twice

use crate::models::member::BetCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which backend query failed for a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    Recharges,
    FirstChargeRecords,
    Bets(BetCategory),
    /// Worker task ended without a usable result
    Worker,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Recharges => f.write_str("recharges"),
            QueryKind::FirstChargeRecords => f.write_str("first_charge_records"),
            QueryKind::Bets(category) => write!(f, "bets[{}]", category),
            QueryKind::Worker => f.write_str("worker"),
        }
    }
}

/// Non-fatal condition recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum Diagnostic {
    NoDownline {
        reference_id: String,
    },

    NoActivity,

    BelowFloor {
        recharging_count: u64,
        total_recharge: i64,
        total_bet: i64,
    },

    PartialData {
        user_id: String,
        query: QueryKind,
        reason: String,
    },

    LevelOutOfRange {
        user_id: String,
        relative_level: i32,
    },

    NotDescendant {
        user_id: String,
        relative_level: i32,
    },

    DuplicateMember {
        user_id: String,
    },
}

impl Diagnostic {
    /// Stable code for matching in a comparison layer
    pub fn code(&self) -> &'static str {
        match self {
            Diagnostic::NoDownline { .. } => "NoDownline",
            Diagnostic::NoActivity => "NoActivity",
            Diagnostic::BelowFloor { .. } => "BelowFloor",
            Diagnostic::PartialData { .. } => "PartialData",
            Diagnostic::LevelOutOfRange { .. } => "LevelOutOfRange",
            Diagnostic::NotDescendant { .. } => "NotDescendant",
            Diagnostic::DuplicateMember { .. } => "DuplicateMember",
        }
    }

    /// Member the diagnostic refers to, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Diagnostic::PartialData { user_id, .. }
            | Diagnostic::LevelOutOfRange { user_id, .. }
            | Diagnostic::NotDescendant { user_id, .. }
            | Diagnostic::DuplicateMember { user_id } => Some(user_id.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NoDownline { reference_id } => {
                write!(f, "NoDownline: agent {} has no descendants", reference_id)
            }
            Diagnostic::NoActivity => write!(f, "NoActivity: team has no recharges or bets"),
            Diagnostic::BelowFloor {
                recharging_count,
                total_recharge,
                total_bet,
            } => write!(
                f,
                "BelowFloor: team ({}, {}, {}) qualifies for no tier",
                recharging_count, total_recharge, total_bet
            ),
            Diagnostic::PartialData {
                user_id,
                query,
                reason,
            } => write!(f, "PartialData: {} query {} failed: {}", user_id, query, reason),
            Diagnostic::LevelOutOfRange {
                user_id,
                relative_level,
            } => write!(
                f,
                "LevelOutOfRange: {} at relative level {} is outside the rebate levels",
                user_id, relative_level
            ),
            Diagnostic::NotDescendant {
                user_id,
                relative_level,
            } => write!(
                f,
                "NotDescendant: {} at relative level {} excluded from team",
                user_id, relative_level
            ),
            Diagnostic::DuplicateMember { user_id } => {
                write!(f, "DuplicateMember: {} listed more than once", user_id)
            }
        }
    }
}
