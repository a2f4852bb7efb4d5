// Founder Watch - Core Library
// Departure detection and classification for a tracked roster of
// professionals, with per-employer target-count reconciliation.

pub mod config;
pub mod db;
pub mod signals;
pub mod classifier;
pub mod registry;
pub mod reconciliation;
pub mod monitor;

// Re-export commonly used types
pub use config::{MonitorConfig, DEFAULT_TARGET_COUNT};
pub use db::{
    normalize_employer_key, setup_database, EmploymentSnapshot, NotFound, PersonStatus,
    TrackedPerson, TrackingStore,
};
pub use signals::{Signal, SignalExtractor, SignalSet};
pub use classifier::{AlertLevel, DepartureClassifier, DepartureEvent};
pub use registry::{EmployerTarget, EmployerTargetRegistry, InvalidTarget};
pub use reconciliation::{
    CandidateProfile, LookupError, ProfileLookup, ReconciliationEngine, ReconciliationReport,
};
pub use monitor::{CheckCycleSummary, EmploymentMonitor, TrackingStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
