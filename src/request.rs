// 📝 Request Model - Typed form submissions
// One Request = one row of the registration form, already classified

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PLATE ID
// ============================================================================

/// License plate number (digits only, dashes stripped by the normalizer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlateId(pub u64);

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PlateId {
    fn from(value: u64) -> Self {
        PlateId(value)
    }
}

// ============================================================================
// HOUSEHOLD KEY
// ============================================================================

/// Household identity: surname + street + house number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HouseholdKey {
    pub surname: String,
    pub street: String,
    pub house_number: String,
}

impl HouseholdKey {
    pub fn new(surname: &str, street: &str, house_number: &str) -> Self {
        HouseholdKey {
            surname: surname.to_string(),
            street: street.to_string(),
            house_number: house_number.to_string(),
        }
    }
}

impl fmt::Display for HouseholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} {}", self.surname, self.street, self.house_number)
    }
}

// ============================================================================
// REQUEST KIND
// ============================================================================

/// What the submitter asked for.
///
/// Derived from the two free-text survey answers by the normalizer.
/// Anything that doesn't map to a known combination lands in `Unhandled`
/// together with the raw answers, so it can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Household not registered yet: add one or two cars
    RegisterNew,

    /// Swap an existing plate for a new one
    ReplaceExisting,

    /// Registered household adds its second car
    AddSecondCar,

    /// Drop an existing plate
    RemoveExisting,

    /// Survey answers matched nothing we know
    Unhandled {
        is_registered: String,
        action: String,
    },
}

impl RequestKind {
    pub fn name(&self) -> &str {
        match self {
            RequestKind::RegisterNew => "register_new",
            RequestKind::ReplaceExisting => "replace_existing",
            RequestKind::AddSecondCar => "add_second_car",
            RequestKind::RemoveExisting => "remove_existing",
            RequestKind::Unhandled { .. } => "unhandled",
        }
    }
}

// ============================================================================
// VEHICLE CLAIM
// ============================================================================

/// One car as described in the form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleClaim {
    /// Owner's name as typed (may still contain the surname)
    pub owner_name: String,

    /// National id
    pub owner_id: Option<i64>,

    /// Plate being registered
    pub plate_id: Option<PlateId>,

    /// Plate being replaced or removed
    pub target_plate_id: Option<PlateId>,

    /// New plate for a replacement
    pub replacement_plate_id: Option<PlateId>,
}

impl VehicleClaim {
    pub fn new(owner_name: &str, owner_id: Option<i64>, plate_id: Option<PlateId>) -> Self {
        VehicleClaim {
            owner_name: owner_name.to_string(),
            owner_id,
            plate_id,
            ..Default::default()
        }
    }

    /// Builder pattern: plate to replace/remove
    pub fn with_target(mut self, target: Option<PlateId>) -> Self {
        self.target_plate_id = target;
        self
    }

    /// Builder pattern: plate that replaces the target
    pub fn with_replacement(mut self, replacement: Option<PlateId>) -> Self {
        self.replacement_plate_id = replacement;
        self
    }
}

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Submission instant (total order key)
    pub timestamp: NaiveDateTime,

    pub household_key: HouseholdKey,

    pub kind: RequestKind,

    pub primary: Option<VehicleClaim>,

    pub secondary: Option<VehicleClaim>,

    // Contact fields, carried onto created entries
    pub email: Option<String>,
    pub apartment: Option<u32>,

    /// 1-based line in the source export (None when built in code)
    pub source_line: Option<usize>,
}

impl Request {
    pub fn new(timestamp: NaiveDateTime, household_key: HouseholdKey, kind: RequestKind) -> Self {
        Request {
            timestamp,
            household_key,
            kind,
            primary: None,
            secondary: None,
            email: None,
            apartment: None,
            source_line: None,
        }
    }

    /// Builder pattern: first car
    pub fn with_primary(mut self, claim: VehicleClaim) -> Self {
        self.primary = Some(claim);
        self
    }

    /// Builder pattern: second car
    pub fn with_secondary(mut self, claim: VehicleClaim) -> Self {
        self.secondary = Some(claim);
        self
    }

    /// Builder pattern: provenance line
    pub fn with_source_line(mut self, line: usize) -> Self {
        self.source_line = Some(line);
        self
    }
}

// ============================================================================
// REQUEST REFERENCE
// ============================================================================

/// Points an anomaly or event back at the request that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    /// 0-based position in the input sequence
    pub sequence: usize,
    pub submitted_at: NaiveDateTime,
    pub source_line: Option<usize>,
    pub household: String,
}

impl RequestRef {
    pub fn of(sequence: usize, request: &Request) -> Self {
        RequestRef {
            sequence,
            submitted_at: request.timestamp,
            source_line: request.source_line,
            household: request.household_key.to_string(),
        }
    }
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_line {
            Some(line) => write!(f, "#{} (line {}, {})", self.sequence, line, self.submitted_at),
            None => write!(f, "#{} ({})", self.sequence, self.submitted_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_request_builder() {
        let req = Request::new(ts(), HouseholdKey::new("Doe", "Oak", "4"), RequestKind::RegisterNew)
            .with_primary(VehicleClaim::new("Jane", Some(1), Some(PlateId(100))))
            .with_source_line(7);

        assert_eq!(req.primary.as_ref().unwrap().plate_id, Some(PlateId(100)));
        assert!(req.secondary.is_none());
        assert_eq!(req.source_line, Some(7));
    }

    #[test]
    fn test_request_ref_display() {
        let req = Request::new(ts(), HouseholdKey::new("Doe", "Oak", "4"), RequestKind::RegisterNew)
            .with_source_line(3);
        let r = RequestRef::of(0, &req);

        assert_eq!(r.household, "Doe, Oak 4");
        assert_eq!(r.to_string(), "#0 (line 3, 2022-03-01 10:00:00)");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(RequestKind::RegisterNew.name(), "register_new");
        let unhandled = RequestKind::Unhandled {
            is_registered: "maybe".to_string(),
            action: String::new(),
        };
        assert_eq!(unhandled.name(), "unhandled");
    }
}
