// 🔍 Signal Extractor - snapshot → classification evidence
// Pure function of its input: same snapshot + config always yields the
// same signal set. Missing or malformed fields mean "no match", never an error.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::db::EmploymentSnapshot;

// ============================================================================
// SIGNALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Employer headcount bucket is in the small-company range
    StartupSize,

    /// Employer founded within the configured recency window
    RecentFounding,

    /// Title matches a founder/CTO pattern
    FounderTitle,

    /// Employer name empty while title or headline is non-empty
    StealthMode,

    /// Building/stealth phrase found in free text
    BuildingSignal,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::StartupSize => "startup_size",
            Signal::RecentFounding => "recent_founding",
            Signal::FounderTitle => "founder_title",
            Signal::StealthMode => "stealth_mode",
            Signal::BuildingSignal => "building_signal",
        }
    }
}

/// Set of signals extracted from one snapshot. Signals are non-exclusive -
/// all that match are recorded, for audit and explainability.
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    signals: Vec<Signal>,

    /// Matched building phrases, e.g. "\"stealth mode\" in headline"
    pub matched_phrases: Vec<String>,
}

impl SignalSet {
    pub fn add(&mut self, signal: Signal) {
        if !self.signals.contains(&signal) {
            self.signals.push(signal);
        }
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Structural signals: employer facts and title, stronger evidence of a
    /// founding event than free-text phrasing. These drive Level 3.
    pub fn has_structural(&self) -> bool {
        self.contains(Signal::StartupSize)
            || self.contains(Signal::RecentFounding)
            || self.contains(Signal::FounderTitle)
            || self.contains(Signal::StealthMode)
    }

    /// Signal names plus matched phrases, in match order
    pub fn audit_trail(&self) -> Vec<String> {
        let mut names: Vec<String> = self.signals.iter().map(|s| s.as_str().to_string()).collect();
        names.extend(self.matched_phrases.iter().cloned());
        names
    }
}

// ============================================================================
// SIGNAL EXTRACTOR
// ============================================================================

pub struct SignalExtractor {
    config: MonitorConfig,
}

impl SignalExtractor {
    pub fn new(config: MonitorConfig) -> Self {
        SignalExtractor { config }
    }

    /// Extract all signals from a snapshot, evaluated against the current year
    pub fn extract(&self, snapshot: &EmploymentSnapshot) -> SignalSet {
        self.extract_at(snapshot, Utc::now().year())
    }

    /// Extraction with an explicit "current year", for deterministic tests
    pub fn extract_at(&self, snapshot: &EmploymentSnapshot, current_year: i32) -> SignalSet {
        let mut set = SignalSet::default();

        if self.is_startup_size(&snapshot.employer_size_bucket) {
            set.add(Signal::StartupSize);
        }

        if let Some(founded) = snapshot.employer_founded_year {
            if founded >= current_year - self.config.founding_recency_years {
                set.add(Signal::RecentFounding);
            }
        }

        if self.has_founder_title(&snapshot.title) {
            set.add(Signal::FounderTitle);
        }

        // Empty employer with non-empty profile text = stealth mode
        if snapshot.employer_name.trim().is_empty()
            && (!snapshot.title.trim().is_empty() || !snapshot.headline.trim().is_empty())
        {
            set.add(Signal::StealthMode);
        }

        self.detect_building_phrases(snapshot, &mut set);

        set
    }

    /// Check the headcount bucket's lower bound against the startup threshold.
    /// Buckets look like "11-50", "1-10", "10000+". Unparseable means no match.
    fn is_startup_size(&self, bucket: &str) -> bool {
        match parse_bucket_lower_bound(bucket) {
            Some(lower) => lower <= self.config.startup_size_max,
            None => false,
        }
    }

    fn has_founder_title(&self, title: &str) -> bool {
        if title.trim().is_empty() {
            return false;
        }

        let title_lower = title.to_lowercase();
        self.config
            .founder_title_keywords
            .iter()
            .any(|kw| title_lower.contains(&kw.to_lowercase()))
    }

    /// Case-insensitive substring match over title, headline and summary.
    /// First matching phrase short-circuits per field, but every field is
    /// checked so the audit trail names each source.
    fn detect_building_phrases(&self, snapshot: &EmploymentSnapshot, set: &mut SignalSet) {
        let fields = [
            ("title", &snapshot.title),
            ("headline", &snapshot.headline),
            ("summary", &snapshot.summary),
        ];

        for (field_name, text) in fields {
            if text.trim().is_empty() {
                continue;
            }

            let text_lower = text.to_lowercase();

            for phrase in &self.config.building_phrases {
                if text_lower.contains(&phrase.to_lowercase()) {
                    set.add(Signal::BuildingSignal);
                    set.matched_phrases
                        .push(format!("\"{}\" in {}", phrase, field_name));
                    break;
                }
            }
        }
    }
}

/// Lower bound of a PDL-style headcount bucket:
/// "11-50" → 11, "10000+" → 10000, "1,001-5,000" → 1001
fn parse_bucket_lower_bound(bucket: &str) -> Option<i64> {
    let cleaned = bucket.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    let lower_part = cleaned
        .split('-')
        .next()
        .unwrap_or("")
        .trim_end_matches('+')
        .trim();

    lower_part.parse::<i64>().ok()
}

// ============================================================================
// TESTS
// ============================================================================
