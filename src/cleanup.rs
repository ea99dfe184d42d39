// 🧹 Post-processing - Runs once over the final registry
// 1. Name cleanup: trim, drop surname tokens typed into the first-name field
// 2. Plate dedup: sort by owner id, keep the first entry per plate

use crate::registry::RegistryEntry;
use crate::request::PlateId;
use std::cmp::Ordering;
use std::collections::HashSet;

// ============================================================================
// NAME CLEANUP
// ============================================================================

/// Remove the surname from a given-name field.
///
/// Only trailing or embedded occurrences count ("Jane Doe" → "Jane").
/// A leading surname is left alone, as is a name that *is* just the surname.
pub fn strip_surname(owner_name: &str, surname: &str) -> String {
    let name = owner_name.trim();
    let surname_tokens: Vec<&str> = surname.split_whitespace().collect();
    if surname_tokens.is_empty() {
        return name.to_string();
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i > 0 && tokens[i..].starts_with(&surname_tokens) {
            i += surname_tokens.len();
            continue;
        }
        kept.push(tokens[i]);
        i += 1;
    }

    if kept.len() == tokens.len() {
        name.to_string()
    } else {
        kept.join(" ")
    }
}

pub fn normalize_names(entries: &mut [RegistryEntry]) {
    for entry in entries.iter_mut() {
        let surname = entry.household_key.surname.trim().to_string();
        entry.owner_name = strip_surname(&entry.owner_name, &surname);
        entry.household_key.surname = surname;
    }
}

// ============================================================================
// PLATE DEDUP
// ============================================================================

/// Owner ids ascending, entries without an id last
fn by_owner_id(a: &RegistryEntry, b: &RegistryEntry) -> Ordering {
    match (a.owner_id, b.owner_id) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Surviving entries, sorted by owner id
    pub kept: Vec<RegistryEntry>,

    /// Entries dropped because an earlier one held the same plate
    pub collapsed: Vec<RegistryEntry>,
}

/// Stable sort by owner id, then keep the first entry per plate
pub fn dedupe_by_plate(mut entries: Vec<RegistryEntry>) -> DedupOutcome {
    entries.sort_by(by_owner_id);

    let mut seen: HashSet<PlateId> = HashSet::new();
    let mut outcome = DedupOutcome::default();
    for entry in entries {
        if seen.insert(entry.plate_id) {
            outcome.kept.push(entry);
        } else {
            outcome.collapsed.push(entry);
        }
    }
    outcome
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HouseholdKey;
    use chrono::NaiveDate;

    fn entry(plate: u64, owner_id: Option<i64>, name: &str, surname: &str) -> RegistryEntry {
        RegistryEntry {
            timestamp: NaiveDate::from_ymd_opt(2022, 2, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            household_key: HouseholdKey::new(surname, "Elm", "12"),
            owner_name: name.to_string(),
            owner_id,
            plate_id: PlateId(plate),
            email: None,
            apartment: None,
        }
    }

    #[test]
    fn test_strip_trailing_surname() {
        assert_eq!(strip_surname("Jane Doe", "Doe"), "Jane");
        assert_eq!(strip_surname("  Jane Doe ", "Doe"), "Jane");
    }

    #[test]
    fn test_strip_embedded_surname() {
        assert_eq!(strip_surname("Jane Doe Smith", "Doe"), "Jane Smith");
    }

    #[test]
    fn test_strip_multi_word_surname() {
        assert_eq!(strip_surname("Dana Ben David", "Ben David"), "Dana");
    }

    #[test]
    fn test_keep_leading_or_only_surname() {
        assert_eq!(strip_surname("Doe", "Doe"), "Doe");
        assert_eq!(strip_surname("Doe Jane", "Doe"), "Doe Jane");
        assert_eq!(strip_surname("Jane", ""), "Jane");
    }

    #[test]
    fn test_surname_must_match_whole_token() {
        assert_eq!(strip_surname("Jane Doering", "Doe"), "Jane Doering");
    }

    #[test]
    fn test_normalize_names_trims_surname() {
        let mut entries = vec![entry(1, None, " Jane Doe", " Doe ")];
        normalize_names(&mut entries);

        assert_eq!(entries[0].owner_name, "Jane");
        assert_eq!(entries[0].household_key.surname, "Doe");
    }

    #[test]
    fn test_dedupe_keeps_lowest_owner_id() {
        let entries = vec![
            entry(100, Some(30), "C", "X"),
            entry(100, Some(10), "A", "X"),
            entry(200, None, "B", "Y"),
        ];
        let outcome = dedupe_by_plate(entries);

        let kept: Vec<_> = outcome.kept.iter().map(|e| e.owner_name.as_str()).collect();
        assert_eq!(kept, vec!["A", "B"]);
        assert_eq!(outcome.collapsed.len(), 1);
        assert_eq!(outcome.collapsed[0].owner_name, "C");
    }

    #[test]
    fn test_dedupe_missing_ids_sort_last_and_stable() {
        let entries = vec![
            entry(1, None, "first", "X"),
            entry(2, Some(5), "id5", "X"),
            entry(3, None, "second", "X"),
        ];
        let outcome = dedupe_by_plate(entries);

        let kept: Vec<_> = outcome.kept.iter().map(|e| e.owner_name.as_str()).collect();
        assert_eq!(kept, vec!["id5", "first", "second"]);
        assert!(outcome.collapsed.is_empty());
    }
}
