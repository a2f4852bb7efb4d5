// 📡 Employment Monitor - per-person check cycle
// The external scheduler calls check_person once per tracked person per
// cycle. Manual removals flow through remove_person, which hands the freed
// slot to the reconciliation engine.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::classifier::{DepartureClassifier, DepartureEvent};
use crate::config::MonitorConfig;
use crate::db::{EmploymentSnapshot, PersonStatus, TrackedPerson, TrackingStore};
use crate::reconciliation::{ProfileLookup, ReconciliationEngine, ReconciliationReport};
use crate::registry::EmployerTargetRegistry;
use crate::signals::SignalExtractor;

// ============================================================================
// CHECK CYCLE SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckCycleSummary {
    pub checked: usize,

    /// People whose current snapshot could not be fetched this cycle
    pub unavailable: usize,

    pub departures: Vec<DepartureEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingStats {
    pub active: i64,
    pub departed: i64,
    pub removed: i64,
    pub departures_by_level: Vec<(i64, i64)>,
}

// ============================================================================
// EMPLOYMENT MONITOR
// ============================================================================

pub struct EmploymentMonitor {
    store: TrackingStore,
    registry: EmployerTargetRegistry,
    extractor: SignalExtractor,
    classifier: DepartureClassifier,
    reconciler: ReconciliationEngine,
}

impl EmploymentMonitor {
    pub fn new(store: TrackingStore, config: MonitorConfig, lookup: Box<dyn ProfileLookup>) -> Self {
        let registry =
            EmployerTargetRegistry::new(store.connection(), config.default_target_count);
        let reconciler = ReconciliationEngine::new(store.clone(), registry.clone(), lookup);

        EmploymentMonitor {
            store,
            registry,
            extractor: SignalExtractor::new(config),
            classifier: DepartureClassifier::new(),
            reconciler,
        }
    }

    pub fn registry(&self) -> &EmployerTargetRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    /// Add a person to tracking. Creates the employer record with the default
    /// target on first sight and bumps tracked_count - the configured target
    /// is never disturbed by this path.
    pub fn add_person(&self, person: &TrackedPerson) -> Result<bool> {
        let added = self.store.insert_person(person)?;

        if added {
            self.registry.record_addition(&person.employer_key(), 1)?;
        }

        Ok(added)
    }

    /// Check one tracked person against a freshly fetched snapshot.
    ///
    /// On departure: the event is appended to the alert log BEFORE
    /// last_known_employer is advanced, so the previous value is never
    /// overwritten without a recorded decision.
    pub fn check_person(
        &self,
        person_id: &str,
        current: &EmploymentSnapshot,
    ) -> Result<Option<DepartureEvent>> {
        let mut person = self.store.get_person(person_id)?;

        if person.status != PersonStatus::Active {
            return Ok(None);
        }

        let now = Utc::now();

        // unchanged hash means the change-relevant fields are identical,
        // so no classification is needed this cycle
        if person.current_snapshot.data_hash() == current.data_hash() {
            person.last_checked_at = now;
            self.store.save_person(&person)?;
            return Ok(None);
        }

        let signals = self.extractor.extract(current);
        let event = self.classifier.classify(
            &person.id,
            &person.full_name,
            &person.last_known_employer,
            current,
            &signals,
            now,
        );

        match event {
            Some(event) => {
                // decision first, then the snapshot advance
                self.store.record_departure(&event)?;

                person.status = PersonStatus::Departed;
                person.last_changed_at = Some(now);
                person.last_known_employer = current.employer_name.clone();
                person.current_snapshot = current.clone();
                person.last_checked_at = now;
                self.store.save_person(&person)?;

                Ok(Some(event))
            }
            None => {
                person.current_snapshot = current.clone();
                person.last_checked_at = now;
                self.store.save_person(&person)?;

                Ok(None)
            }
        }
    }

    /// Run one check cycle over all active people. `fetch_current` is the
    /// per-person profile fetch; None means the source had no answer this
    /// cycle and the person is skipped, not errored.
    pub fn run_check_cycle<F>(&self, fetch_current: F) -> Result<CheckCycleSummary>
    where
        F: Fn(&TrackedPerson) -> Option<EmploymentSnapshot>,
    {
        let mut summary = CheckCycleSummary::default();

        for person in self.store.active_people()? {
            match fetch_current(&person) {
                Some(snapshot) => {
                    summary.checked += 1;
                    if let Some(event) = self.check_person(&person.id, &snapshot)? {
                        summary.departures.push(event);
                    }
                }
                None => summary.unavailable += 1,
            }
        }

        Ok(summary)
    }

    /// Manual removal. Marks the person Removed and reconciles the employer's
    /// tracked population back toward its target.
    pub fn remove_person(&self, person_id: &str) -> Result<ReconciliationReport> {
        let person = self.store.get_person(person_id)?;

        if person.status == PersonStatus::Removed {
            bail!("Person already removed from tracking: {}", person_id);
        }

        self.store.set_status(person_id, PersonStatus::Removed)?;
        self.reconciler.on_person_removed(&person)
    }

    pub fn stats(&self) -> Result<TrackingStats> {
        Ok(TrackingStats {
            active: self.store.count_by_status(PersonStatus::Active)?,
            departed: self.store.count_by_status(PersonStatus::Departed)?,
            removed: self.store.count_by_status(PersonStatus::Removed)?,
            departures_by_level: self.store.departure_counts_by_level()?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::AlertLevel;
    use crate::reconciliation::{CandidateProfile, LookupError};

    struct EmptyLookup;

    impl ProfileLookup for EmptyLookup {
        fn fetch_candidates(
            &self,
            _employer: &str,
            _exclude_ids: &[String],
            _count: usize,
        ) -> Result<Vec<CandidateProfile>, LookupError> {
            Ok(Vec::new())
        }
    }

    struct OneCandidateLookup;

    impl ProfileLookup for OneCandidateLookup {
        fn fetch_candidates(
            &self,
            employer: &str,
            _exclude_ids: &[String],
            count: usize,
        ) -> Result<Vec<CandidateProfile>, LookupError> {
            Ok((0..count.min(1))
                .map(|i| CandidateProfile {
                    id: format!("replacement-{}", i),
                    full_name: "Fresh Hire".to_string(),
                    snapshot: EmploymentSnapshot {
                        employer_name: employer.to_string(),
                        ..Default::default()
                    },
                })
                .collect())
        }
    }

    fn monitor(lookup: Box<dyn ProfileLookup>) -> EmploymentMonitor {
        let store = TrackingStore::open_in_memory().unwrap();
        EmploymentMonitor::new(store, MonitorConfig::default(), lookup)
    }

    fn person(id: &str, employer: &str) -> TrackedPerson {
        TrackedPerson::new(
            id.to_string(),
            format!("Person {}", id),
            employer.to_string(),
            EmploymentSnapshot {
                employer_name: employer.to_string(),
                employer_size_bucket: "10000+".to_string(),
                title: "Engineer".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_add_person_creates_employer_record_with_default_target() {
        let monitor = monitor(Box::new(EmptyLookup));

        assert!(monitor.add_person(&person("p1", "OpenAI")).unwrap());
        assert!(monitor.add_person(&person("p2", "OpenAI")).unwrap());
        // re-adding is not a new slot
        assert!(!monitor.add_person(&person("p1", "OpenAI")).unwrap());

        let target = monitor.registry().get("openai").unwrap().unwrap();
        assert_eq!(target.tracked_count, 2);
        assert_eq!(target.target_count, 5);
    }

    #[test]
    fn test_check_person_no_change_refreshes_snapshot() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();

        let same = EmploymentSnapshot {
            employer_name: "openai".to_string(), // normalizes equal
            title: "Staff Engineer".to_string(),
            ..Default::default()
        };

        let event = monitor.check_person("p1", &same).unwrap();
        assert!(event.is_none());

        let loaded = monitor.store().get_person("p1").unwrap();
        assert_eq!(loaded.status, PersonStatus::Active);
        assert_eq!(loaded.current_snapshot.title, "Staff Engineer");
        assert!(loaded.last_changed_at.is_none());
        // unchanged employer is not silently rewritten
        assert_eq!(loaded.last_known_employer, "OpenAI");
    }

    #[test]
    fn test_check_person_identical_hash_skips_classification() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();

        // employer, title and size unchanged: the hash matches and the
        // snapshot is not rewritten, only the check timestamp advances
        let mut same = monitor.store().get_person("p1").unwrap().current_snapshot;
        same.headline = "Building something new".to_string();

        let before = monitor.store().get_person("p1").unwrap().last_checked_at;
        let event = monitor.check_person("p1", &same).unwrap();
        assert!(event.is_none());

        let loaded = monitor.store().get_person("p1").unwrap();
        assert_eq!(loaded.status, PersonStatus::Active);
        assert!(loaded.current_snapshot.headline.is_empty());
        assert!(loaded.last_checked_at >= before);
        assert!(monitor.store().departures(10).unwrap().is_empty());
    }

    #[test]
    fn test_check_person_departure_records_event_then_advances_employer() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();

        let moved = EmploymentSnapshot {
            employer_name: "Microsoft".to_string(),
            employer_size_bucket: "10000+".to_string(),
            title: "Principal Engineer".to_string(),
            ..Default::default()
        };

        let event = monitor.check_person("p1", &moved).unwrap().unwrap();
        assert_eq!(event.level, AlertLevel::Level1);
        assert_eq!(event.from_employer, "OpenAI");
        assert_eq!(event.to_employer, "Microsoft");

        let loaded = monitor.store().get_person("p1").unwrap();
        assert_eq!(loaded.status, PersonStatus::Departed);
        assert_eq!(loaded.last_known_employer, "Microsoft");
        assert!(loaded.last_changed_at.is_some());

        // event landed in the alert log
        let log = monitor.store().departures(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].person_id, "p1");
    }

    #[test]
    fn test_departed_person_is_not_rechecked() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();

        let moved = EmploymentSnapshot {
            employer_name: "Microsoft".to_string(),
            ..Default::default()
        };
        monitor.check_person("p1", &moved).unwrap().unwrap();

        // a second check of the same person emits nothing
        let again = monitor.check_person("p1", &moved).unwrap();
        assert!(again.is_none());
        assert_eq!(monitor.store().departures(10).unwrap().len(), 1);
    }

    #[test]
    fn test_run_check_cycle_collects_departures_and_skips_unavailable() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();
        monitor.add_person(&person("p2", "OpenAI")).unwrap();
        monitor.add_person(&person("p3", "Meta")).unwrap();

        let summary = monitor
            .run_check_cycle(|p| match p.id.as_str() {
                "p1" => Some(EmploymentSnapshot {
                    employer_name: "Microsoft".to_string(),
                    ..Default::default()
                }),
                "p2" => None, // source had no answer
                _ => Some(p.current_snapshot.clone()),
            })
            .unwrap();

        assert_eq!(summary.checked, 2);
        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.departures.len(), 1);
        assert_eq!(summary.departures[0].person_id, "p1");
    }

    #[test]
    fn test_remove_person_triggers_refill() {
        let monitor = monitor(Box::new(OneCandidateLookup));

        monitor.add_person(&person("p1", "OpenAI")).unwrap();
        monitor.registry().set_target("OpenAI", 1).unwrap();

        let report = monitor.remove_person("p1").unwrap();
        assert_eq!(report.previous_count, 0);
        assert_eq!(report.target_count, 1);
        assert_eq!(report.replaced, 1);

        let target = monitor.registry().get("openai").unwrap().unwrap();
        assert_eq!(target.tracked_count, 1);
        assert_eq!(target.target_count, 1);

        let replacement = monitor.store().get_person("replacement-0").unwrap();
        assert_eq!(replacement.status, PersonStatus::Active);
    }

    #[test]
    fn test_remove_person_twice_fails() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();

        monitor.remove_person("p1").unwrap();
        assert!(monitor.remove_person("p1").is_err());
    }

    #[test]
    fn test_stats() {
        let monitor = monitor(Box::new(EmptyLookup));
        monitor.add_person(&person("p1", "OpenAI")).unwrap();
        monitor.add_person(&person("p2", "Meta")).unwrap();

        monitor
            .check_person(
                "p1",
                &EmploymentSnapshot {
                    employer_name: "Microsoft".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let stats = monitor.stats().unwrap();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.departed, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.departures_by_level, vec![(1, 1)]);
    }
}
