// ⚠️ Anomalies - Recoverable reconciliation failures
// Collected during the pass, never thrown. The caller decides what to do with them.

use crate::registry::RegistryError;
use crate::request::RequestRef;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Insert (or replacement) for a plate already in the registry
    DuplicatePlate,

    /// Replace/remove referenced a plate nobody holds
    TargetNotFound,

    /// Replace/remove referenced a plate held by several entries
    TargetAmbiguous,

    /// Survey answers didn't match any known combination
    UnrecognizedRequest,

    /// A required claim or plate number was left empty
    MissingPlate,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::DuplicatePlate => "duplicate_plate",
            AnomalyKind::TargetNotFound => "target_not_found",
            AnomalyKind::TargetAmbiguous => "target_ambiguous",
            AnomalyKind::UnrecognizedRequest => "unrecognized_request",
            AnomalyKind::MissingPlate => "missing_plate",
        }
    }

    /// Kinds that point at bad upstream data rather than a normal race
    pub fn needs_manual_review(&self) -> bool {
        matches!(
            self,
            AnomalyKind::TargetAmbiguous | AnomalyKind::UnrecognizedRequest
        )
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RegistryError> for AnomalyKind {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::DuplicatePlate { .. } => AnomalyKind::DuplicatePlate,
            RegistryError::TargetNotFound { .. } => AnomalyKind::TargetNotFound,
            RegistryError::TargetAmbiguous { .. } => AnomalyKind::TargetAmbiguous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub request: RequestRef,
    pub kind: AnomalyKind,
    pub detail: String,
}

impl Anomaly {
    pub fn new(request: RequestRef, kind: AnomalyKind, detail: impl Into<String>) -> Self {
        Anomaly {
            request,
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_registry_error(request: RequestRef, err: &RegistryError) -> Self {
        Anomaly::new(request, AnomalyKind::from(err), err.to_string())
    }
}
