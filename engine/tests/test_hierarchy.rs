//! Tests for Hierarchy Resolution
//!
//! relative_level = absolute_level(member) - absolute_level(reference)
//! The reference agent never appears in its own roster.

use chrono::{TimeZone, Utc};
use rebate_engine_core::{resolve_hierarchy, DescendantRecord, Diagnostic, HierarchyError, RebateMode};

/// Helper to create a listing entry
fn record(user_id: &str, absolute_level: i32) -> DescendantRecord {
    DescendantRecord {
        user_id: user_id.to_string(),
        absolute_level,
        registered_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
        rebate_mode: RebateMode::Normal,
    }
}

#[test]
fn test_relative_levels_from_reference() {
    let records = vec![
        record("ROOT", 3),
        record("A", 4),
        record("B", 5),
        record("C", 9),
    ];

    let (roster, diagnostics) = resolve_hierarchy("ROOT", &records).unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(roster.reference_level(), 3);
    let levels: Vec<(&str, i32)> = roster
        .full_team()
        .iter()
        .map(|m| (m.user_id(), m.relative_level()))
        .collect();
    assert_eq!(levels, vec![("A", 1), ("B", 2), ("C", 6)]);
}

#[test]
fn test_reference_agent_excluded() {
    let records = vec![record("A", 4), record("ROOT", 3), record("B", 4)];

    let (roster, _) = resolve_hierarchy("ROOT", &records).unwrap();

    assert_eq!(roster.len(), 2);
    assert!(roster.full_team().iter().all(|m| m.user_id() != "ROOT"));
}

#[test]
fn test_first_level_partition() {
    let records = vec![
        record("ROOT", 0),
        record("A", 1),
        record("B", 2),
        record("C", 1),
        record("D", 3),
    ];

    let (roster, _) = resolve_hierarchy("ROOT", &records).unwrap();

    let first: Vec<&str> = roster.first_level().map(|m| m.user_id()).collect();
    assert_eq!(first, vec!["A", "C"]);
    assert_eq!(roster.full_team().len(), 4);
}

#[test]
fn test_levels_beyond_six_stay_in_team() {
    // Bucketing is the calculator's concern; the roster keeps everyone below
    let records = vec![record("ROOT", 1), record("DEEP", 9)];

    let (roster, diagnostics) = resolve_hierarchy("ROOT", &records).unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(roster.full_team()[0].relative_level(), 8);
}

// ============================================================================
// Degenerate listings
// ============================================================================

#[test]
fn test_empty_listing_is_no_downline() {
    let err = resolve_hierarchy("ROOT", &[]).unwrap_err();
    assert_eq!(
        err,
        HierarchyError::NoDownline {
            reference_id: "ROOT".to_string()
        }
    );
}

#[test]
fn test_reference_only_is_no_downline() {
    let err = resolve_hierarchy("ROOT", &[record("ROOT", 2)]).unwrap_err();
    assert!(matches!(err, HierarchyError::NoDownline { .. }));
}

#[test]
fn test_missing_reference_is_rejected() {
    let err = resolve_hierarchy("ROOT", &[record("A", 4)]).unwrap_err();
    assert_eq!(
        err,
        HierarchyError::ReferenceMissing {
            reference_id: "ROOT".to_string()
        }
    );
}

#[test]
fn test_non_descendants_reported_not_rostered() {
    let records = vec![
        record("ROOT", 3),
        record("PEER", 3),
        record("UPLINE", 2),
        record("A", 4),
    ];

    let (roster, diagnostics) = resolve_hierarchy("ROOT", &records).unwrap();

    assert_eq!(roster.len(), 1);
    assert_eq!(
        diagnostics,
        vec![
            Diagnostic::NotDescendant {
                user_id: "PEER".to_string(),
                relative_level: 0
            },
            Diagnostic::NotDescendant {
                user_id: "UPLINE".to_string(),
                relative_level: -1
            },
        ]
    );
}

#[test]
fn test_duplicate_member_keeps_first_entry() {
    let mut second = record("A", 6);
    second.rebate_mode = RebateMode::Locked(2);
    let records = vec![record("ROOT", 3), record("A", 4), second];

    let (roster, diagnostics) = resolve_hierarchy("ROOT", &records).unwrap();

    assert_eq!(roster.len(), 1);
    assert_eq!(roster.full_team()[0].relative_level(), 1);
    assert_eq!(roster.full_team()[0].rebate_mode(), RebateMode::Normal);
    assert_eq!(diagnostics[0].code(), "DuplicateMember");
}

#[test]
fn test_rebate_mode_carried_onto_member() {
    let mut special = record("S", 4);
    special.rebate_mode = RebateMode::Special(3);

    let (roster, _) = resolve_hierarchy("ROOT", &[record("ROOT", 3), special]).unwrap();

    assert_eq!(roster.full_team()[0].rebate_mode(), RebateMode::Special(3));
    assert!(roster.full_team()[0].data_complete());
}
