// 🚗 Cars Registry - Keyed table of known vehicles
//
// Entries live in an arena (slot = stable EntryId) and are indexed by plate.
// The plate index maps to a list of ids so that a snapshot loaded with
// duplicates can still be represented; engine-driven inserts never create one.

use crate::request::{HouseholdKey, PlateId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// REGISTRY ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Submission time of the request that created this entry
    pub timestamp: NaiveDateTime,
    pub household_key: HouseholdKey,
    pub owner_name: String,
    pub owner_id: Option<i64>,
    pub plate_id: PlateId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub apartment: Option<u32>,
}

/// Stable identity of an entry inside one registry.
/// Survives plate changes, never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

// ============================================================================
// LOOKUP + ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Unique(EntryId),
    Ambiguous(Vec<EntryId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plate {plate} already exists")]
    DuplicatePlate { plate: PlateId },

    #[error("plate {plate} not found")]
    TargetNotFound { plate: PlateId },

    #[error("plate {plate} matches {matches} entries")]
    TargetAmbiguous { plate: PlateId, matches: usize },
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Option<RegistryEntry>>,
    by_plate: HashMap<PlateId, Vec<EntryId>>,
    live: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Load a snapshot as-is. No uniqueness check: legacy data may already
    /// hold duplicate plates, which later show up as ambiguous lookups.
    pub fn from_entries(entries: Vec<RegistryEntry>) -> Self {
        let mut registry = Registry::new();
        for entry in entries {
            registry.push(entry);
        }
        registry
    }

    fn push(&mut self, entry: RegistryEntry) -> EntryId {
        let id = EntryId(self.slots.len());
        self.by_plate.entry(entry.plate_id).or_default().push(id);
        self.slots.push(Some(entry));
        self.live += 1;
        id
    }

    fn unlink(&mut self, plate: PlateId, id: EntryId) {
        if let Some(ids) = self.by_plate.get_mut(&plate) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_plate.remove(&plate);
            }
        }
    }

    pub fn find(&self, plate: PlateId) -> Lookup {
        match self.by_plate.get(&plate).map(Vec::as_slice) {
            None | Some([]) => Lookup::NotFound,
            Some([id]) => Lookup::Unique(*id),
            Some(ids) => Lookup::Ambiguous(ids.to_vec()),
        }
    }

    /// Resolve a plate to exactly one entry or explain why not
    fn resolve(&self, plate: PlateId) -> Result<EntryId, RegistryError> {
        match self.find(plate) {
            Lookup::Unique(id) => Ok(id),
            Lookup::NotFound => Err(RegistryError::TargetNotFound { plate }),
            Lookup::Ambiguous(ids) => Err(RegistryError::TargetAmbiguous {
                plate,
                matches: ids.len(),
            }),
        }
    }

    /// Append a new entry. Rejected (no-op) if any entry holds the plate.
    pub fn insert(&mut self, entry: RegistryEntry) -> Result<EntryId, RegistryError> {
        if self.find(entry.plate_id) != Lookup::NotFound {
            return Err(RegistryError::DuplicatePlate {
                plate: entry.plate_id,
            });
        }
        Ok(self.push(entry))
    }

    /// Move the unique entry holding `old` to plate `new`, keeping its identity
    pub fn update_plate(&mut self, old: PlateId, new: PlateId) -> Result<EntryId, RegistryError> {
        let id = self.resolve(old)?;
        if old == new {
            return Ok(id);
        }
        if self.find(new) != Lookup::NotFound {
            return Err(RegistryError::DuplicatePlate { plate: new });
        }

        self.unlink(old, id);
        if let Some(entry) = self.slots[id.0].as_mut() {
            entry.plate_id = new;
        }
        self.by_plate.entry(new).or_default().push(id);
        Ok(id)
    }

    /// Delete the unique entry holding `plate`
    pub fn remove(&mut self, plate: PlateId) -> Result<RegistryEntry, RegistryError> {
        let id = self.resolve(plate)?;
        self.unlink(plate, id);
        let removed = self.slots[id.0]
            .take()
            .ok_or(RegistryError::TargetNotFound { plate })?;
        self.live -= 1;
        Ok(removed)
    }

    pub fn get(&self, id: EntryId) -> Option<&RegistryEntry> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Live entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn into_entries(self) -> Vec<RegistryEntry> {
        self.slots.into_iter().flatten().collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(plate: u64, owner: &str) -> RegistryEntry {
        RegistryEntry {
            timestamp: NaiveDate::from_ymd_opt(2022, 1, 10)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            household_key: HouseholdKey::new("Doe", "Oak", "4"),
            owner_name: owner.to_string(),
            owner_id: None,
            plate_id: PlateId(plate),
            email: None,
            apartment: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let mut registry = Registry::new();
        let id = registry.insert(entry(100, "A")).unwrap();

        assert_eq!(registry.find(PlateId(100)), Lookup::Unique(id));
        assert_eq!(registry.find(PlateId(200)), Lookup::NotFound);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_duplicate_is_noop() {
        let mut registry = Registry::new();
        registry.insert(entry(100, "A")).unwrap();

        let err = registry.insert(entry(100, "B")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePlate { plate: PlateId(100) });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries().next().unwrap().owner_name, "A");
    }

    #[test]
    fn test_update_plate_preserves_identity() {
        let mut registry = Registry::new();
        let id = registry.insert(entry(100, "A")).unwrap();

        let updated = registry.update_plate(PlateId(100), PlateId(200)).unwrap();
        assert_eq!(updated, id);
        assert_eq!(registry.find(PlateId(100)), Lookup::NotFound);
        assert_eq!(registry.find(PlateId(200)), Lookup::Unique(id));
        assert_eq!(registry.get(id).unwrap().owner_name, "A");
    }

    #[test]
    fn test_update_plate_missing_target() {
        let mut registry = Registry::new();
        let err = registry.update_plate(PlateId(1), PlateId(2)).unwrap_err();
        assert_eq!(err, RegistryError::TargetNotFound { plate: PlateId(1) });
    }

    #[test]
    fn test_update_plate_onto_taken_plate() {
        let mut registry = Registry::new();
        registry.insert(entry(100, "A")).unwrap();
        registry.insert(entry(200, "B")).unwrap();

        let err = registry.update_plate(PlateId(100), PlateId(200)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePlate { plate: PlateId(200) });
        assert!(matches!(registry.find(PlateId(100)), Lookup::Unique(_)));
    }

    #[test]
    fn test_update_plate_same_plate() {
        let mut registry = Registry::new();
        let id = registry.insert(entry(100, "A")).unwrap();
        assert_eq!(registry.update_plate(PlateId(100), PlateId(100)), Ok(id));
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::new();
        registry.insert(entry(100, "A")).unwrap();
        registry.insert(entry(200, "B")).unwrap();

        let removed = registry.remove(PlateId(100)).unwrap();
        assert_eq!(removed.owner_name, "A");
        assert_eq!(registry.len(), 1);

        let err = registry.remove(PlateId(100)).unwrap_err();
        assert_eq!(err, RegistryError::TargetNotFound { plate: PlateId(100) });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_legacy_duplicates_are_ambiguous() {
        let mut registry = Registry::from_entries(vec![entry(100, "A"), entry(100, "B")]);

        assert!(matches!(registry.find(PlateId(100)), Lookup::Ambiguous(ids) if ids.len() == 2));
        let err = registry.remove(PlateId(100)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::TargetAmbiguous {
                plate: PlateId(100),
                matches: 2
            }
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut registry = Registry::new();
        registry.insert(entry(3, "C")).unwrap();
        registry.insert(entry(1, "A")).unwrap();
        registry.insert(entry(2, "B")).unwrap();
        registry.remove(PlateId(1)).unwrap();

        let owners: Vec<_> = registry.entries().map(|e| e.owner_name.as_str()).collect();
        assert_eq!(owners, vec!["C", "B"]);
        assert_eq!(registry.into_entries().len(), 2);
    }
}
