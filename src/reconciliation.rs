// ⚖️ Reconciliation Engine - keep tracked populations at target
// When a person is removed, the employer's slot count drops below its
// configured target and replacements are acquired from the profile source.
// Partial or zero fulfillment is reported as data, never as an error.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::{normalize_employer_key, EmploymentSnapshot, TrackedPerson, TrackingStore};
use crate::registry::EmployerTargetRegistry;

// ============================================================================
// PROFILE LOOKUP (external client seam)
// ============================================================================

/// Candidate returned by the external profile source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: String,
    pub full_name: String,
    pub snapshot: EmploymentSnapshot,
}

#[derive(Debug, Clone)]
pub enum LookupError {
    /// External source outage. Non-fatal: reconciliation degrades to zero
    /// candidates and the employer stays under target until the next cycle.
    SourceUnavailable(String),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::SourceUnavailable(msg) => {
                write!(f, "Profile source unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// External profile-lookup client. May return fewer candidates than requested;
/// retries, if any, belong to the implementation, not to this engine.
pub trait ProfileLookup {
    fn fetch_candidates(
        &self,
        employer: &str,
        exclude_ids: &[String],
        count: usize,
    ) -> Result<Vec<CandidateProfile>, LookupError>;
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub employer_key: String,
    pub removed: bool,

    /// tracked_count right after the removal was recorded
    pub previous_count: i64,

    pub target_count: i64,

    /// Replacements actually acquired, 0..=deficit
    pub replaced: i64,
}

impl ReconciliationReport {
    pub fn is_fully_reconciled(&self) -> bool {
        self.target_count == 0 || self.previous_count + self.replaced >= self.target_count
    }

    pub fn summary(&self) -> String {
        if self.target_count == 0 {
            return format!(
                "Removed from {} (reconciliation disabled, {} still tracked)",
                self.employer_key, self.previous_count
            );
        }

        format!(
            "Removed from {}: {} tracked / {} target, {} replacement(s) acquired",
            self.employer_key, self.previous_count, self.target_count, self.replaced
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    store: TrackingStore,
    registry: EmployerTargetRegistry,
    lookup: Box<dyn ProfileLookup>,
}

impl ReconciliationEngine {
    pub fn new(
        store: TrackingStore,
        registry: EmployerTargetRegistry,
        lookup: Box<dyn ProfileLookup>,
    ) -> Self {
        ReconciliationEngine {
            store,
            registry,
            lookup,
        }
    }

    /// Restore the employer's tracked population after a removal.
    ///
    /// The removal is recorded atomically first; the slow external lookup runs
    /// without holding the storage lock, so a transient window where the
    /// population sits below target is expected and tolerated.
    pub fn on_person_removed(&self, person: &TrackedPerson) -> Result<ReconciliationReport> {
        let employer = person.employer_at_tracking_start.clone();
        let key = normalize_employer_key(&employer);

        let (tracked_count, target_count) = self.registry.record_removal(&key)?;

        let mut report = ReconciliationReport {
            employer_key: key.clone(),
            removed: true,
            previous_count: tracked_count,
            target_count,
            replaced: 0,
        };

        // target_count == 0 means the user opted this employer out:
        // no acquisition call at all
        if target_count == 0 {
            return Ok(report);
        }

        if tracked_count >= target_count {
            return Ok(report);
        }

        let deficit = (target_count - tracked_count) as usize;

        // exclude everyone ever tracked for this employer, any status -
        // a removed person must not be re-acquired
        let exclude = self.store.person_ids_for_employer(&key)?;

        let candidates = match self.lookup.fetch_candidates(&employer, &exclude, deficit) {
            Ok(candidates) => candidates,
            Err(LookupError::SourceUnavailable(_)) => Vec::new(),
        };

        let mut added = 0i64;
        for candidate in candidates.into_iter().take(deficit) {
            if exclude.contains(&candidate.id) {
                continue;
            }

            let replacement = TrackedPerson::new(
                candidate.id,
                candidate.full_name,
                employer.clone(),
                candidate.snapshot,
            );

            if self.store.insert_person(&replacement)? {
                added += 1;
            }
        }

        // record_addition touches tracked_count only, the configured
        // target survives untouched
        if added > 0 {
            self.registry.record_addition(&key, added)?;
        }

        report.replaced = added;
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
