use anyhow::Result;
use std::env;

use founder_watch::{
    CandidateProfile, EmploymentMonitor, EmploymentSnapshot, LookupError, MonitorConfig,
    ProfileLookup, TrackedPerson, TrackingStore,
};

const DB_PATH: &str = "data/tracking.db";

/// Placeholder for the external profile source. The CLI runs without
/// credentials, so removals reconcile with zero replacements and the
/// employer stays under target until a real client fills the gap.
struct OfflineLookup;

impl ProfileLookup for OfflineLookup {
    fn fetch_candidates(
        &self,
        _employer: &str,
        _exclude_ids: &[String],
        _count: usize,
    ) -> std::result::Result<Vec<CandidateProfile>, LookupError> {
        Err(LookupError::SourceUnavailable(
            "no profile source configured".to_string(),
        ))
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("add") => run_add(&args[2..]),
        Some("status") => run_status(),
        Some("targets") => run_targets(),
        Some("set-target") => run_set_target(&args[2..]),
        Some("remove") => run_remove(&args[2..]),
        Some("departures") => run_departures(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Founder Watch v{}", founder_watch::VERSION);
    println!();
    println!("Usage:");
    println!("  founder-watch init                        Initialize the tracking database");
    println!("  founder-watch add <id> <name> <employer> [title]");
    println!("                                            Add a person to tracking");
    println!("  founder-watch status                      Show tracking statistics");
    println!("  founder-watch targets                     List employer targets");
    println!("  founder-watch set-target <employer> <n>   Set an employer's target count");
    println!("  founder-watch remove <person-id>          Remove a person from tracking");
    println!("  founder-watch departures                  Show recent departure alerts");
}

fn open_monitor() -> Result<EmploymentMonitor> {
    let store = TrackingStore::open(DB_PATH)?;
    Ok(EmploymentMonitor::new(
        store,
        MonitorConfig::default(),
        Box::new(OfflineLookup),
    ))
}

fn run_init() -> Result<()> {
    std::fs::create_dir_all("data")?;
    let _store = TrackingStore::open(DB_PATH)?;

    println!("✓ Database initialized at {}", DB_PATH);
    Ok(())
}

fn run_add(args: &[String]) -> Result<()> {
    let (id, name, employer) = match (args.first(), args.get(1), args.get(2)) {
        (Some(id), Some(name), Some(employer)) => (id, name, employer),
        _ => {
            eprintln!("Usage: founder-watch add <id> <name> <employer> [title]");
            std::process::exit(1);
        }
    };
    let title = args.get(3).cloned().unwrap_or_default();

    let monitor = open_monitor()?;
    let person = TrackedPerson::new(
        id.clone(),
        name.clone(),
        employer.clone(),
        EmploymentSnapshot {
            employer_name: employer.clone(),
            title,
            ..Default::default()
        },
    );

    if monitor.add_person(&person)? {
        let target = monitor.registry().get_or_create(employer)?;
        println!(
            "✓ Tracking {} at '{}' ({} tracked / {} target)",
            name, employer, target.tracked_count, target.target_count
        );
    } else {
        println!("Already tracking person '{}'", id);
    }

    Ok(())
}

fn run_status() -> Result<()> {
    let monitor = open_monitor()?;
    let stats = monitor.stats()?;

    println!("📡 Tracking Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Active:   {}", stats.active);
    println!("  Departed: {}", stats.departed);
    println!("  Removed:  {}", stats.removed);

    if !stats.departures_by_level.is_empty() {
        println!("\n  Departure alerts:");
        for (level, count) in &stats.departures_by_level {
            println!("    Level {}: {}", level, count);
        }
    }

    Ok(())
}

fn run_targets() -> Result<()> {
    let monitor = open_monitor()?;
    let targets = monitor.registry().all_targets()?;

    if targets.is_empty() {
        println!("No employers under tracking yet.");
        return Ok(());
    }

    println!("🎯 Employer Targets");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for target in targets {
        let note = if target.target_count == 0 {
            "  (reconciliation disabled)"
        } else if target.deficit() > 0 {
            "  ⚠️ under target"
        } else {
            ""
        };

        println!(
            "  {:<24} {:>2} tracked / {:>2} target{}",
            target.employer_key, target.tracked_count, target.target_count, note
        );
    }

    Ok(())
}

fn run_set_target(args: &[String]) -> Result<()> {
    let (employer, count) = match (args.first(), args.get(1)) {
        (Some(employer), Some(count)) => (employer, count.parse::<i64>()?),
        _ => {
            eprintln!("Usage: founder-watch set-target <employer> <n>");
            std::process::exit(1);
        }
    };

    let monitor = open_monitor()?;
    monitor.registry().set_target(employer, count)?;

    println!("✓ Target for '{}' set to {}", employer, count);
    Ok(())
}

fn run_remove(args: &[String]) -> Result<()> {
    let person_id = match args.first() {
        Some(id) => id,
        None => {
            eprintln!("Usage: founder-watch remove <person-id>");
            std::process::exit(1);
        }
    };

    let monitor = open_monitor()?;
    let report = monitor.remove_person(person_id)?;

    println!("✓ {}", report.summary());
    if !report.is_fully_reconciled() {
        println!("  ⚠️ Employer remains under target until the next acquisition.");
    }

    Ok(())
}

fn run_departures() -> Result<()> {
    let monitor = open_monitor()?;
    let departures = monitor.store().departures(50)?;

    if departures.is_empty() {
        println!("No departures detected yet.");
        return Ok(());
    }

    println!("🚨 Recent Departures");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for event in departures {
        println!("  {}", event.summary());
        if !event.signals.is_empty() {
            println!("    Signals: {}", event.signals.join(", "));
        }
    }

    Ok(())
}
