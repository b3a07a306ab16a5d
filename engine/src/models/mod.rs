//! Domain models for the rebate engine

pub mod diagnostic;
pub mod member;
pub mod report;

// Re-exports
pub use diagnostic::{Diagnostic, QueryKind};
pub use member::{BetCategory, CategoryBets, Member, RebateMode};
pub use report::{GroupSummary, MemberBreakdown, RebateReport};
