// 🔧 Monitor Configuration - explicit config, not ambient state
// Phrase lists and thresholds are passed into the extractor/classifier
// so every run is deterministic and parallel-safe.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// System-wide default target count for newly created employer records
pub const DEFAULT_TARGET_COUNT: i64 = 5;

// ============================================================================
// MONITOR CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Building/stealth phrases matched case-insensitively against
    /// title, headline and summary text
    #[serde(default = "default_building_phrases")]
    pub building_phrases: Vec<String>,

    /// Title keywords that indicate a founding role
    #[serde(default = "default_founder_keywords")]
    pub founder_title_keywords: Vec<String>,

    /// Largest headcount-bucket lower bound still considered a startup
    #[serde(default = "default_startup_size_max")]
    pub startup_size_max: i64,

    /// Companies founded within this many years count as recently founded
    #[serde(default = "default_founding_recency_years")]
    pub founding_recency_years: i32,

    /// Target count assigned to an employer record on first creation
    #[serde(default = "default_target_count")]
    pub default_target_count: i64,
}

fn default_startup_size_max() -> i64 {
    50
}

fn default_founding_recency_years() -> i32 {
    5
}

fn default_target_count() -> i64 {
    DEFAULT_TARGET_COUNT
}

fn default_founder_keywords() -> Vec<String> {
    [
        "founder",
        "co-founder",
        "cofounder",
        "founding",
        "cto",
        "ceo",
        "chief executive",
        "entrepreneur",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_building_phrases() -> Vec<String> {
    [
        // Direct building statements
        "building something new",
        "building something cool",
        "building something exciting",
        "building something big",
        "building something",
        "building in stealth",
        "building the future",
        "building ai",
        // Working on variations
        "working on something new",
        "working on something exciting",
        "working on something big",
        "working on a new venture",
        "working on a startup",
        "working on stealth",
        // Creating / launching
        "creating something new",
        "launching soon",
        "launching startup",
        "starting something new",
        "starting a company",
        "new venture",
        // Stealth / confidential
        "stealth mode",
        "stealth startup",
        "stealth",
        "under wraps",
        // Coming soon
        "stay tuned",
        "more to come",
        "watch this space",
        "big things coming",
        "next chapter",
        "new journey",
        "new adventure",
        // Vague but telling
        "taking time off to",
        "taking a break",
        "on sabbatical",
        "exploring ideas",
        "exploring opportunities",
        "figuring out what's next",
        "pre-seed",
        "zero to one",
        "0 to 1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            building_phrases: default_building_phrases(),
            founder_title_keywords: default_founder_keywords(),
            startup_size_max: default_startup_size_max(),
            founding_recency_years: default_founding_recency_years(),
            default_target_count: default_target_count(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to the built-in defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: MonitorConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();

        assert_eq!(config.startup_size_max, 50);
        assert_eq!(config.founding_recency_years, 5);
        assert_eq!(config.default_target_count, 5);
        assert!(config.building_phrases.len() > 20);
        assert!(config
            .building_phrases
            .contains(&"building something new".to_string()));
        assert!(config
            .founder_title_keywords
            .contains(&"co-founder".to_string()));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"startup_size_max": 100}"#).unwrap();

        assert_eq!(config.startup_size_max, 100);
        assert_eq!(config.default_target_count, DEFAULT_TARGET_COUNT);
        assert!(!config.building_phrases.is_empty());
    }
}
