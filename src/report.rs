// 📊 Report Generator - Household views over the final registry
// Read-only consumer: groups entries by household, never mutates them.

use crate::registry::RegistryEntry;
use crate::request::HouseholdKey;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// HOUSEHOLD GROUPING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHousehold {
    pub household: HouseholdKey,
    /// Earliest submission among the household's cars
    pub first_seen: NaiveDateTime,
}

pub struct HouseholdReport<'a> {
    groups: BTreeMap<&'a HouseholdKey, Vec<&'a RegistryEntry>>,
}

impl<'a> HouseholdReport<'a> {
    /// Group by household key (sorted key order, registry order inside a group)
    pub fn build(entries: &'a [RegistryEntry]) -> Self {
        let mut groups: BTreeMap<&HouseholdKey, Vec<&RegistryEntry>> = BTreeMap::new();
        for entry in entries {
            groups.entry(&entry.household_key).or_default().push(entry);
        }
        HouseholdReport { groups }
    }

    pub fn household_count(&self) -> usize {
        self.groups.len()
    }

    /// Every car of every household holding more than `max_cars`
    pub fn over_capacity(&self, max_cars: usize) -> Vec<&'a RegistryEntry> {
        self.groups
            .values()
            .filter(|cars| cars.len() > max_cars)
            .flat_map(|cars| cars.iter().copied())
            .collect()
    }

    /// Households whose first car was submitted strictly after `cutoff`
    pub fn new_households(&self, cutoff: NaiveDateTime) -> Vec<NewHousehold> {
        self.groups
            .iter()
            .filter_map(|(key, cars)| {
                let first_seen = cars.iter().map(|c| c.timestamp).min()?;
                (first_seen > cutoff).then(|| NewHousehold {
                    household: (*key).clone(),
                    first_seen,
                })
            })
            .collect()
    }
}

// ============================================================================
// LPR EXPORT ROWS
// ============================================================================

/// One line of the allow-list consumed by the plate-recognition system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LprRow {
    pub car_id: u64,
    pub name: String,
    pub surname: String,
    pub full_name: String,
}

/// Allow-list rows, stable-sorted by surname
pub fn lpr_rows(entries: &[RegistryEntry]) -> Vec<LprRow> {
    let mut rows: Vec<LprRow> = entries
        .iter()
        .map(|e| LprRow {
            car_id: e.plate_id.0,
            name: e.owner_name.clone(),
            surname: e.household_key.surname.clone(),
            full_name: format!("{} {}", e.owner_name, e.household_key.surname),
        })
        .collect();
    rows.sort_by(|a, b| a.surname.cmp(&b.surname));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PlateId;
    use chrono::NaiveDate;

    fn at(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn car(surname: &str, number: &str, plate: u64, ts: NaiveDateTime) -> RegistryEntry {
        RegistryEntry {
            timestamp: ts,
            household_key: HouseholdKey::new(surname, "Oak", number),
            owner_name: format!("owner{}", plate),
            owner_id: None,
            plate_id: PlateId(plate),
            email: None,
            apartment: None,
        }
    }

    #[test]
    fn test_over_capacity_is_strict() {
        let entries = vec![
            car("Doe", "1", 1, at(1, 1)),
            car("Doe", "1", 2, at(1, 2)),
            car("Roe", "2", 3, at(1, 1)),
            car("Roe", "2", 4, at(1, 1)),
            car("Roe", "2", 5, at(1, 1)),
        ];
        let report = HouseholdReport::build(&entries);

        assert_eq!(report.household_count(), 2);
        let flagged: Vec<u64> = report.over_capacity(2).iter().map(|e| e.plate_id.0).collect();
        assert_eq!(flagged, vec![3, 4, 5]);
        assert!(report.over_capacity(3).is_empty());
    }

    #[test]
    fn test_same_surname_other_address_is_other_household() {
        let entries = vec![car("Doe", "1", 1, at(1, 1)), car("Doe", "9", 2, at(1, 1))];
        let report = HouseholdReport::build(&entries);

        assert_eq!(report.household_count(), 2);
        assert!(report.over_capacity(1).is_empty());
    }

    #[test]
    fn test_new_households_after_cutoff() {
        let entries = vec![
            car("Old", "1", 1, at(4, 1)),
            car("Old", "1", 2, at(6, 1)),
            car("New", "2", 3, at(6, 3)),
            car("Edge", "3", 4, at(5, 1)),
        ];
        let report = HouseholdReport::build(&entries);

        let fresh = report.new_households(at(5, 1));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].household.surname, "New");
        assert_eq!(fresh[0].first_seen, at(6, 3));
    }

    #[test]
    fn test_lpr_rows_sorted_by_surname() {
        let mut b = car("Bet", "1", 20, at(1, 1));
        b.owner_name = "Dana".to_string();
        let a = car("Alef", "1", 10, at(1, 1));

        let rows = lpr_rows(&[b, a]);
        assert_eq!(rows[0].surname, "Alef");
        assert_eq!(rows[1].full_name, "Dana Bet");
        assert_eq!(rows[1].car_id, 20);
    }
}
