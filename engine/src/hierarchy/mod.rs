//! Hierarchy Resolution
//!
//! Turns the backend's downline listing into a flat roster positioned
//! relative to the reference agent:
//!
//! ```text
//! relative_level = absolute_level(member) - absolute_level(reference)
//! ```
//!
//! The reference agent itself is excluded. Entries at or above the
//! reference (relative level <= 0) and repeated user ids are left out of the
//! roster and reported as diagnostics.

use crate::models::diagnostic::Diagnostic;
use crate::models::member::Member;
use crate::source::DescendantRecord;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum HierarchyError {
    /// Nothing below the reference agent; callers degrade to an all-zero report
    #[error("Agent {reference_id} has no downline")]
    NoDownline { reference_id: String },

    #[error("Reference agent {reference_id} missing from its own descendant listing")]
    ReferenceMissing { reference_id: String },
}

/// Flat team roster for one reference agent
#[derive(Debug, Clone)]
pub struct Roster {
    reference_id: String,
    reference_level: i32,
    members: Vec<Member>,
}

impl Roster {
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn reference_level(&self) -> i32 {
        self.reference_level
    }

    /// Every member with relative level >= 1, in listing order
    pub fn full_team(&self) -> &[Member] {
        &self.members
    }

    /// Direct referrals (relative level 1)
    pub fn first_level(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.is_first_level())
    }

    pub fn members_mut(&mut self) -> &mut [Member] {
        &mut self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Build the roster for `reference_id` from its descendant listing
///
/// Returns the roster together with diagnostics for entries that were left
/// out.
///
/// # Errors
///
/// - [`HierarchyError::NoDownline`] when the listing is empty or nothing is
///   below the reference agent
/// - [`HierarchyError::ReferenceMissing`] when the reference agent's own
///   entry is absent, so no level origin exists
pub fn resolve_hierarchy(
    reference_id: &str,
    records: &[DescendantRecord],
) -> Result<(Roster, Vec<Diagnostic>), HierarchyError> {
    if records.is_empty() {
        return Err(HierarchyError::NoDownline {
            reference_id: reference_id.to_string(),
        });
    }

    let reference_level = records
        .iter()
        .find(|r| r.user_id == reference_id)
        .map(|r| r.absolute_level)
        .ok_or_else(|| HierarchyError::ReferenceMissing {
            reference_id: reference_id.to_string(),
        })?;

    let mut diagnostics = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut members = Vec::with_capacity(records.len().saturating_sub(1));

    for record in records.iter().filter(|r| r.user_id != reference_id) {
        if !seen.insert(record.user_id.as_str()) {
            warn!(user_id = %record.user_id, "duplicate member in descendant listing");
            diagnostics.push(Diagnostic::DuplicateMember {
                user_id: record.user_id.clone(),
            });
            continue;
        }

        let relative_level = record.absolute_level - reference_level;
        if relative_level < 1 {
            warn!(
                user_id = %record.user_id,
                relative_level,
                "listing entry is not below the reference agent"
            );
            diagnostics.push(Diagnostic::NotDescendant {
                user_id: record.user_id.clone(),
                relative_level,
            });
            continue;
        }

        members.push(Member::new(
            record.user_id.clone(),
            record.absolute_level,
            relative_level,
            record.registered_at,
            record.rebate_mode,
        ));
    }

    if members.is_empty() {
        return Err(HierarchyError::NoDownline {
            reference_id: reference_id.to_string(),
        });
    }

    Ok((
        Roster {
            reference_id: reference_id.to_string(),
            reference_level,
            members,
        },
        diagnostics,
    ))
}
