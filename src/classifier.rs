// 🚨 Departure Classifier - three alert levels
// Level 3 (RED): structural founding evidence - startup size, recent
//                founding, founder title, stealth mode
// Level 2 (ORANGE): building/stealth phrases in free text
// Level 1 (YELLOW): any other employer-to-employer move

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{normalize_employer_key, EmploymentSnapshot};
use crate::signals::{Signal, SignalSet};

// ============================================================================
// ALERT LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    /// Baseline departure, monitor
    Level1,

    /// Building signals detected, high priority
    Level2,

    /// Structural founding evidence, immediate
    Level3,
}

impl AlertLevel {
    pub fn priority(&self) -> i64 {
        match self {
            AlertLevel::Level1 => 1,
            AlertLevel::Level2 => 2,
            AlertLevel::Level3 => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlertLevel::Level1 => "Departed",
            AlertLevel::Level2 => "Building",
            AlertLevel::Level3 => "Startup",
        }
    }

    pub fn from_priority(priority: i64) -> Result<Self> {
        match priority {
            1 => Ok(AlertLevel::Level1),
            2 => Ok(AlertLevel::Level2),
            3 => Ok(AlertLevel::Level3),
            other => bail!("Unknown alert level: {}", other),
        }
    }
}

// ============================================================================
// DEPARTURE EVENT
// ============================================================================

/// Created once per detected departure, immutable thereafter.
/// The signals list carries the matched signal names for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartureEvent {
    pub event_id: String,
    pub person_id: String,
    pub person_name: String,
    pub from_employer: String,
    pub to_employer: String,
    pub to_title: String,
    pub level: AlertLevel,
    pub signals: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl DepartureEvent {
    pub fn summary(&self) -> String {
        let destination = if self.to_employer.trim().is_empty() {
            "(stealth)".to_string()
        } else {
            self.to_employer.clone()
        };

        format!(
            "[LEVEL {}] ({}) {} left {} → {}",
            self.level.priority(),
            self.level.name(),
            self.person_name,
            self.from_employer,
            destination
        )
    }
}

// ============================================================================
// DEPARTURE CLASSIFIER
// ============================================================================

/// Pure decision function: no retries, no side effects. Malformed or missing
/// snapshot fields degrade to "no signal", never an error.
pub struct DepartureClassifier;

impl DepartureClassifier {
    pub fn new() -> Self {
        DepartureClassifier
    }

    /// Decide whether a departure occurred and assign its alert level.
    ///
    /// A departure is declared iff the normalized current employer differs
    /// from the previous one, or the current employer is empty while the
    /// previous one was not (stealth-mode departure). Both empty, or both
    /// normalizing equal, is not a departure.
    pub fn classify(
        &self,
        person_id: &str,
        person_name: &str,
        previous_employer: &str,
        snapshot: &EmploymentSnapshot,
        signals: &SignalSet,
        detected_at: DateTime<Utc>,
    ) -> Option<DepartureEvent> {
        let previous = normalize_employer_key(previous_employer);
        let current = normalize_employer_key(&snapshot.employer_name);

        if previous == current {
            return None;
        }

        if previous.is_empty() && current.is_empty() {
            return None;
        }

        // current empty + previous non-empty falls through: stealth departure

        let level = Self::assign_level(signals);

        Some(DepartureEvent {
            event_id: Uuid::new_v4().to_string(),
            person_id: person_id.to_string(),
            person_name: person_name.to_string(),
            from_employer: previous_employer.trim().to_string(),
            to_employer: snapshot.employer_name.trim().to_string(),
            to_title: snapshot.title.trim().to_string(),
            level,
            signals: signals.audit_trail(),
            detected_at,
        })
    }

    /// Fixed precedence, first match wins, ties resolve upward.
    /// Structural employer facts outrank text-derived signals.
    fn assign_level(signals: &SignalSet) -> AlertLevel {
        if signals.has_structural() {
            return AlertLevel::Level3;
        }

        if signals.contains(Signal::BuildingSignal) {
            return AlertLevel::Level2;
        }

        AlertLevel::Level1
    }
}

impl Default for DepartureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::signals::SignalExtractor;

    const YEAR: i32 = 2026;

    fn classify(
        previous: &str,
        snapshot: &EmploymentSnapshot,
    ) -> Option<DepartureEvent> {
        let extractor = SignalExtractor::new(MonitorConfig::default());
        let signals = extractor.extract_at(snapshot, YEAR);
        DepartureClassifier::new().classify("p1", "Test Person", previous, snapshot, &signals, Utc::now())
    }

    fn snapshot(employer: &str) -> EmploymentSnapshot {
        EmploymentSnapshot {
            employer_name: employer.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_employer_is_no_departure() {
        assert!(classify("OpenAI", &snapshot("OpenAI")).is_none());
        // normalization: case and whitespace do not count as a change
        assert!(classify("OpenAI", &snapshot("  openai ")).is_none());
        assert!(classify("Google DeepMind", &snapshot("google  deepmind")).is_none());
    }

    #[test]
    fn test_both_empty_is_no_departure() {
        assert!(classify("", &snapshot("")).is_none());
    }

    #[test]
    fn test_stealth_departure_from_nonempty_previous() {
        let mut snap = snapshot("");
        snap.title = "Figuring it out".to_string();

        let event = classify("OpenAI", &snap).expect("departure expected");
        // empty employer + non-empty title = stealth mode, structural
        assert_eq!(event.level, AlertLevel::Level3);
    }

    #[test]
    fn test_scenario_a_big_company_move_is_level_1() {
        let mut snap = snapshot("Microsoft");
        snap.employer_size_bucket = "10000+".to_string();

        let event = classify("OpenAI", &snap).expect("departure expected");
        assert_eq!(event.level, AlertLevel::Level1);
        assert_eq!(event.from_employer, "OpenAI");
        assert_eq!(event.to_employer, "Microsoft");
    }

    #[test]
    fn test_scenario_b_building_phrase_is_level_2() {
        let mut snap = snapshot("Stealth Mode");
        snap.headline = "Building something new in AI".to_string();

        let event = classify("Anthropic", &snap).expect("departure expected");
        assert_eq!(event.level, AlertLevel::Level2);
        assert!(event
            .signals
            .iter()
            .any(|s| s.contains("building something new")));
    }

    #[test]
    fn test_scenario_c_structural_signals_are_level_3() {
        let snap = EmploymentSnapshot {
            employer_name: "NeuralTech AI".to_string(),
            employer_size_bucket: "11-50".to_string(),
            employer_founded_year: Some(YEAR),
            title: "CTO & Co-Founder".to_string(),
            ..Default::default()
        };

        let event = classify("Meta", &snap).expect("departure expected");
        assert_eq!(event.level, AlertLevel::Level3);
        assert!(event.signals.contains(&"startup_size".to_string()));
        assert!(event.signals.contains(&"recent_founding".to_string()));
        assert!(event.signals.contains(&"founder_title".to_string()));
    }

    #[test]
    fn test_precedence_structural_beats_building() {
        // both a Level-3 signal and a building phrase present
        let snap = EmploymentSnapshot {
            employer_name: "NewCo".to_string(),
            employer_size_bucket: "1-10".to_string(),
            headline: "Building something exciting".to_string(),
            ..Default::default()
        };

        let event = classify("Google", &snap).expect("departure expected");
        assert_eq!(event.level, AlertLevel::Level3);
    }

    #[test]
    fn test_malformed_snapshot_does_not_panic() {
        let snap = EmploymentSnapshot {
            employer_name: "NewCo".to_string(),
            employer_size_bucket: "???".to_string(),
            employer_founded_year: None,
            ..Default::default()
        };

        let event = classify("Google", &snap).expect("departure expected");
        assert_eq!(event.level, AlertLevel::Level1);
    }

    #[test]
    fn test_alert_level_roundtrip() {
        for level in [AlertLevel::Level1, AlertLevel::Level2, AlertLevel::Level3] {
            assert_eq!(AlertLevel::from_priority(level.priority()).unwrap(), level);
        }
        assert!(AlertLevel::from_priority(0).is_err());
        assert!(AlertLevel::from_priority(4).is_err());
    }

    #[test]
    fn test_event_summary_marks_stealth_destination() {
        let mut snap = snapshot("");
        snap.title = "Founder".to_string();

        let event = classify("OpenAI", &snap).unwrap();
        assert!(event.summary().contains("(stealth)"));
    }
}
