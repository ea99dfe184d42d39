// ⚖️ Reconciliation Engine - Replays form requests onto the cars registry
//
// One pass, strictly in input order. Each request is classified by kind and
// turned into at most one registry mutation per vehicle claim. Failures are
// recorded as anomalies; the pass never stops on a bad request.

use crate::anomaly::{Anomaly, AnomalyKind};
use crate::cleanup::{dedupe_by_plate, normalize_names};
use crate::registry::{Registry, RegistryEntry};
use crate::request::{PlateId, Request, RequestKind, RequestRef, VehicleClaim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// MUTATION EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Insert { plate: Option<PlateId> },
    UpdatePlate { from: Option<PlateId>, to: Option<PlateId> },
    Remove { plate: Option<PlateId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied,
    Rejected(AnomalyKind),
}

/// One attempted registry mutation and how it ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub request: RequestRef,
    pub mutation: Mutation,
    pub outcome: MutationOutcome,
}

impl MutationEvent {
    pub fn is_applied(&self) -> bool {
        self.outcome == MutationOutcome::Applied
    }
}

// ============================================================================
// OUTCOME + SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub requests: usize,
    pub applied: usize,
    pub rejected: usize,
    pub anomalies_by_kind: BTreeMap<AnomalyKind, usize>,
    pub entries: usize,
    pub collapsed: usize,
}

impl ReconciliationSummary {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies_by_kind.values().sum()
    }

    pub fn describe(&self) -> String {
        format!(
            "{} requests, {} mutations applied, {} rejected, {} anomalies, {} cars in registry ({} collapsed duplicates)",
            self.requests,
            self.applied,
            self.rejected,
            self.anomaly_count(),
            self.entries,
            self.collapsed
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    /// Final registry after name cleanup and plate dedup, sorted by owner id
    pub entries: Vec<RegistryEntry>,

    pub anomalies: Vec<Anomaly>,

    pub events: Vec<MutationEvent>,

    /// Entries dropped by the dedup pass
    pub collapsed: Vec<RegistryEntry>,

    pub summary: ReconciliationSummary,
}

impl ReconciliationOutcome {
    pub fn anomalies_of(&self, kind: AnomalyKind) -> Vec<&Anomaly> {
        self.anomalies.iter().filter(|a| a.kind == kind).collect()
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    registry: Registry,
    anomalies: Vec<Anomaly>,
    events: Vec<MutationEvent>,
    processed: usize,
}

impl ReconciliationEngine {
    /// Start from an empty registry
    pub fn new() -> Self {
        ReconciliationEngine::default()
    }

    /// Start from a previously stored registry
    pub fn with_registry(registry: Registry) -> Self {
        ReconciliationEngine {
            registry,
            ..Default::default()
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Replay a whole request sequence. The caller owns the ordering.
    pub fn run(mut self, requests: &[Request]) -> ReconciliationOutcome {
        info!(requests = requests.len(), seeded = self.registry.len(), "starting reconciliation pass");
        for request in requests {
            self.apply(request);
        }
        self.finish()
    }

    /// Apply a single request on top of everything applied so far
    pub fn apply(&mut self, request: &Request) {
        let reference = RequestRef::of(self.processed, request);
        self.processed += 1;

        match &request.kind {
            RequestKind::RegisterNew => {
                self.handle_add(&reference, request, request.primary.as_ref(), "primary");
                if let Some(second) = request.secondary.as_ref() {
                    self.handle_add(&reference, request, Some(second), "secondary");
                }
            }
            RequestKind::ReplaceExisting => self.handle_replace(&reference, request.primary.as_ref()),
            RequestKind::AddSecondCar => {
                // The household already has its first car on file
                self.handle_add(&reference, request, request.secondary.as_ref(), "secondary");
            }
            RequestKind::RemoveExisting => self.handle_remove(&reference, request.primary.as_ref()),
            RequestKind::Unhandled {
                is_registered,
                action,
            } => {
                let detail = format!(
                    "unrecognized answers: is_registered='{}', action='{}'",
                    is_registered, action
                );
                self.record(Anomaly::new(reference, AnomalyKind::UnrecognizedRequest, detail));
            }
        }
    }

    fn handle_add(
        &mut self,
        reference: &RequestRef,
        request: &Request,
        claim: Option<&VehicleClaim>,
        slot: &str,
    ) {
        let plate = claim.and_then(|c| c.plate_id);
        let mutation = Mutation::Insert { plate };

        let (claim, plate) = match (claim, plate) {
            (Some(claim), Some(plate)) => (claim, plate),
            (None, _) => {
                let detail = format!("{} vehicle missing from {}", slot, request.kind.name());
                return self.reject(reference, mutation, AnomalyKind::MissingPlate, detail);
            }
            (Some(_), None) => {
                let detail = format!("{} vehicle has no plate number", slot);
                return self.reject(reference, mutation, AnomalyKind::MissingPlate, detail);
            }
        };

        let entry = RegistryEntry {
            timestamp: request.timestamp,
            household_key: request.household_key.clone(),
            owner_name: claim.owner_name.clone(),
            owner_id: claim.owner_id,
            plate_id: plate,
            email: request.email.clone(),
            apartment: request.apartment,
        };

        match self.registry.insert(entry) {
            Ok(_) => self.applied(reference, mutation),
            Err(err) => {
                let anomaly = Anomaly::from_registry_error(reference.clone(), &err);
                self.reject_with(mutation, anomaly);
            }
        }
    }

    fn handle_replace(&mut self, reference: &RequestRef, claim: Option<&VehicleClaim>) {
        let from = claim.and_then(|c| c.target_plate_id);
        let to = claim.and_then(|c| c.replacement_plate_id);
        let mutation = Mutation::UpdatePlate { from, to };

        let (Some(from), Some(to)) = (from, to) else {
            let detail = match (from, to) {
                (None, None) => "replacement without old or new plate",
                (None, Some(_)) => "replacement without the plate to replace",
                _ => "replacement without the new plate",
            };
            return self.reject(reference, mutation, AnomalyKind::MissingPlate, detail);
        };

        match self.registry.update_plate(from, to) {
            Ok(_) => self.applied(reference, mutation),
            Err(err) => {
                let anomaly = Anomaly::from_registry_error(reference.clone(), &err);
                self.reject_with(mutation, anomaly);
            }
        }
    }

    fn handle_remove(&mut self, reference: &RequestRef, claim: Option<&VehicleClaim>) {
        let plate = claim.and_then(|c| c.target_plate_id);
        let mutation = Mutation::Remove { plate };

        let Some(plate) = plate else {
            return self.reject(reference, mutation, AnomalyKind::MissingPlate, "removal without a plate");
        };

        match self.registry.remove(plate) {
            Ok(_) => self.applied(reference, mutation),
            Err(err) => {
                let anomaly = Anomaly::from_registry_error(reference.clone(), &err);
                self.reject_with(mutation, anomaly);
            }
        }
    }

    // ========================================================================
    // BOOKKEEPING
    // ========================================================================

    fn applied(&mut self, reference: &RequestRef, mutation: Mutation) {
        debug!(request = %reference, ?mutation, "applied");
        self.events.push(MutationEvent {
            request: reference.clone(),
            mutation,
            outcome: MutationOutcome::Applied,
        });
    }

    fn reject(
        &mut self,
        reference: &RequestRef,
        mutation: Mutation,
        kind: AnomalyKind,
        detail: impl Into<String>,
    ) {
        self.reject_with(mutation, Anomaly::new(reference.clone(), kind, detail));
    }

    fn reject_with(&mut self, mutation: Mutation, anomaly: Anomaly) {
        self.events.push(MutationEvent {
            request: anomaly.request.clone(),
            mutation,
            outcome: MutationOutcome::Rejected(anomaly.kind),
        });
        self.record(anomaly);
    }

    fn record(&mut self, anomaly: Anomaly) {
        warn!(request = %anomaly.request, kind = %anomaly.kind, "{}", anomaly.detail);
        self.anomalies.push(anomaly);
    }

    /// Close the pass: name cleanup, plate dedup, summary
    pub fn finish(self) -> ReconciliationOutcome {
        let mut entries = self.registry.into_entries();
        normalize_names(&mut entries);
        let dedup = dedupe_by_plate(entries);

        for entry in &dedup.collapsed {
            warn!(plate = %entry.plate_id, household = %entry.household_key, "collapsed duplicate plate");
        }

        let mut anomalies_by_kind = BTreeMap::new();
        for anomaly in &self.anomalies {
            *anomalies_by_kind.entry(anomaly.kind).or_insert(0) += 1;
        }
        let applied = self.events.iter().filter(|e| e.is_applied()).count();

        let summary = ReconciliationSummary {
            requests: self.processed,
            applied,
            rejected: self.events.len() - applied,
            anomalies_by_kind,
            entries: dedup.kept.len(),
            collapsed: dedup.collapsed.len(),
        };
        info!("{}", summary.describe());

        ReconciliationOutcome {
            entries: dedup.kept,
            anomalies: self.anomalies,
            events: self.events,
            collapsed: dedup.collapsed,
            summary,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
