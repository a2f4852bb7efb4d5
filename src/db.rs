use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::classifier::DepartureEvent;

// ============================================================================
// EMPLOYMENT SNAPSHOT
// ============================================================================

/// Current employment state of a person, as returned by the profile source.
/// An empty employer name is a valid value - it means stealth mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmploymentSnapshot {
    pub employer_name: String,

    /// PDL-style headcount bucket, e.g. "11-50", "10000+"
    pub employer_size_bucket: String,

    pub employer_founded_year: Option<i32>,

    pub title: String,

    pub headline: String,

    pub summary: String,

    pub profile_url: String,
}

impl EmploymentSnapshot {
    /// Hash of the change-relevant fields, used to skip unchanged profiles.
    /// NOTE: this is for CHANGE DETECTION, not identity - identity is the
    /// person id, which is stable across snapshots.
    pub fn data_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.employer_name, self.title, self.employer_size_bucket
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TRACKED PERSON
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonStatus {
    /// Under tracking, checked every cycle
    Active,

    /// Departure detected, kept in the roster for history
    Departed,

    /// Removed from tracking (manual removal), slot eligible for refill
    Removed,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Active => "active",
            PersonStatus::Departed => "departed",
            PersonStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(PersonStatus::Active),
            "departed" => Ok(PersonStatus::Departed),
            "removed" => Ok(PersonStatus::Removed),
            other => bail!("Unknown person status: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPerson {
    /// Stable identity from the profile source - never changes across snapshots
    pub id: String,

    pub full_name: String,

    /// Employer the person was tracked for, immutable once set
    pub employer_at_tracking_start: String,

    /// Employer snapshot captured at the previous check. Advanced only after
    /// the classification decision for the prior value has been recorded.
    pub last_known_employer: String,

    pub current_snapshot: EmploymentSnapshot,

    pub status: PersonStatus,

    /// Set only when a departure is detected
    pub last_changed_at: Option<DateTime<Utc>>,

    pub tracking_started_at: DateTime<Utc>,

    pub last_checked_at: DateTime<Utc>,
}

impl TrackedPerson {
    pub fn new(
        id: String,
        full_name: String,
        tracking_employer: String,
        snapshot: EmploymentSnapshot,
    ) -> Self {
        let now = Utc::now();

        TrackedPerson {
            id,
            full_name,
            last_known_employer: snapshot.employer_name.clone(),
            employer_at_tracking_start: tracking_employer,
            current_snapshot: snapshot,
            status: PersonStatus::Active,
            last_changed_at: None,
            tracking_started_at: now,
            last_checked_at: now,
        }
    }

    /// Normalized key of the employer this person occupies a tracking slot for
    pub fn employer_key(&self) -> String {
        normalize_employer_key(&self.employer_at_tracking_start)
    }
}

/// Normalize an employer name into a registry key:
/// trim, lowercase, collapse inner whitespace.
pub fn normalize_employer_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// NOT FOUND
// ============================================================================

/// Direct lookup of an unknown person or employer key
#[derive(Debug, Clone)]
pub struct NotFound {
    pub entity: &'static str,
    pub key: String,
}

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.entity, self.key)
    }
}

impl std::error::Error for NotFound {}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracked_people (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            employer_at_tracking_start TEXT NOT NULL,
            employer_key TEXT NOT NULL,
            last_known_employer TEXT NOT NULL,
            employer_name TEXT NOT NULL,
            employer_size_bucket TEXT NOT NULL,
            employer_founded_year INTEGER,
            title TEXT NOT NULL,
            headline TEXT NOT NULL,
            summary TEXT NOT NULL,
            profile_url TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            last_changed_at TEXT,
            tracking_started_at TEXT NOT NULL,
            last_checked_at TEXT NOT NULL
        )",
        [],
    )?;

    // Per-employer counters. tracked_count is owned by the reconciliation
    // path, target_count is owned by the user configuration path - mutations
    // must touch their own column only, never replace the whole row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS employer_targets (
            employer_key TEXT PRIMARY KEY,
            tracked_count INTEGER NOT NULL DEFAULT 0,
            target_count INTEGER NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;

    // Alert log - departure events are immutable once appended
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            person_id TEXT NOT NULL,
            person_name TEXT NOT NULL,
            from_employer TEXT NOT NULL,
            to_employer TEXT NOT NULL,
            to_title TEXT NOT NULL,
            alert_level INTEGER NOT NULL,
            signals TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_people_status ON tracked_people(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_people_employer ON tracked_people(employer_key)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_departures_level ON departures(alert_level)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TRACKING STORE
// ============================================================================

/// Single-writer handle over the tracking database.
///
/// All mutations go through one connection behind a mutex, which linearizes
/// read-modify-write operations on shared counters (see EmployerTargetRegistry).
#[derive(Clone)]
pub struct TrackingStore {
    conn: Arc<Mutex<Connection>>,
}

impl TrackingStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        setup_database(&conn)?;

        Ok(TrackingStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;

        Ok(TrackingStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared connection handle, used by the employer target registry
    /// so all writers serialize on the same lock.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Insert a person, or refresh last_checked_at if already tracked.
    /// Returns true if the person was newly added.
    pub fn insert_person(&self, person: &TrackedPerson) -> Result<bool> {
        let conn = self.conn.lock().unwrap();

        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM tracked_people WHERE id = ?1",
                params![person.id],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_some() {
            conn.execute(
                "UPDATE tracked_people SET last_checked_at = ?1 WHERE id = ?2",
                params![person.last_checked_at.to_rfc3339(), person.id],
            )?;
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO tracked_people (
                id, full_name, employer_at_tracking_start, employer_key,
                last_known_employer, employer_name, employer_size_bucket,
                employer_founded_year, title, headline, summary, profile_url,
                status, last_changed_at, tracking_started_at, last_checked_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                person.id,
                person.full_name,
                person.employer_at_tracking_start,
                person.employer_key(),
                person.last_known_employer,
                person.current_snapshot.employer_name,
                person.current_snapshot.employer_size_bucket,
                person.current_snapshot.employer_founded_year,
                person.current_snapshot.title,
                person.current_snapshot.headline,
                person.current_snapshot.summary,
                person.current_snapshot.profile_url,
                person.status.as_str(),
                person.last_changed_at.map(|dt| dt.to_rfc3339()),
                person.tracking_started_at.to_rfc3339(),
                person.last_checked_at.to_rfc3339(),
            ],
        )?;

        Ok(true)
    }

    pub fn get_person(&self, id: &str) -> Result<TrackedPerson> {
        let conn = self.conn.lock().unwrap();

        let person = conn
            .query_row(
                &format!("SELECT {} FROM tracked_people WHERE id = ?1", PERSON_COLUMNS),
                params![id],
                row_to_person,
            )
            .optional()?;

        person.ok_or_else(|| {
            NotFound {
                entity: "person",
                key: id.to_string(),
            }
            .into()
        })
    }

    /// Save the mutable state of a tracked person. Person rows are wholly
    /// owned by the engine, so a full-field update is safe here.
    pub fn save_person(&self, person: &TrackedPerson) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE tracked_people SET
                last_known_employer = ?1,
                employer_name = ?2,
                employer_size_bucket = ?3,
                employer_founded_year = ?4,
                title = ?5,
                headline = ?6,
                summary = ?7,
                profile_url = ?8,
                status = ?9,
                last_changed_at = ?10,
                last_checked_at = ?11
            WHERE id = ?12",
            params![
                person.last_known_employer,
                person.current_snapshot.employer_name,
                person.current_snapshot.employer_size_bucket,
                person.current_snapshot.employer_founded_year,
                person.current_snapshot.title,
                person.current_snapshot.headline,
                person.current_snapshot.summary,
                person.current_snapshot.profile_url,
                person.status.as_str(),
                person.last_changed_at.map(|dt| dt.to_rfc3339()),
                person.last_checked_at.to_rfc3339(),
                person.id,
            ],
        )?;

        if changed == 0 {
            return Err(NotFound {
                entity: "person",
                key: person.id.clone(),
            }
            .into());
        }

        Ok(())
    }

    pub fn set_status(&self, id: &str, status: PersonStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE tracked_people SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;

        if changed == 0 {
            return Err(NotFound {
                entity: "person",
                key: id.to_string(),
            }
            .into());
        }

        Ok(())
    }

    pub fn active_people(&self) -> Result<Vec<TrackedPerson>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracked_people WHERE status = 'active'
             ORDER BY employer_key, full_name",
            PERSON_COLUMNS
        ))?;

        let people = stmt
            .query_map([], row_to_person)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(people)
    }

    /// All person ids ever tracked for an employer, regardless of status.
    /// Used as the exclusion list for replacement acquisition - a removed
    /// person must not be re-acquired.
    pub fn person_ids_for_employer(&self, employer_key: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT id FROM tracked_people WHERE employer_key = ?1")?;

        let ids = stmt
            .query_map(params![employer_key], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    pub fn count_by_status(&self, status: PersonStatus) -> Result<i64> {
        let conn = self.conn.lock().unwrap();

        let count = conn.query_row(
            "SELECT COUNT(*) FROM tracked_people WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Append a departure event to the alert log
    pub fn record_departure(&self, event: &DepartureEvent) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let signals_json = serde_json::to_string(&event.signals)?;

        conn.execute(
            "INSERT INTO departures (
                event_id, person_id, person_name, from_employer,
                to_employer, to_title, alert_level, signals, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.event_id,
                event.person_id,
                event.person_name,
                event.from_employer,
                event.to_employer,
                event.to_title,
                event.level.priority(),
                signals_json,
                event.detected_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    pub fn departures(&self, limit: usize) -> Result<Vec<DepartureEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT event_id, person_id, person_name, from_employer,
                    to_employer, to_title, alert_level, signals, detected_at
             FROM departures
             ORDER BY detected_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (event_id, person_id, person_name, from, to, to_title, level, signals, detected) in rows
        {
            events.push(DepartureEvent {
                event_id,
                person_id,
                person_name,
                from_employer: from,
                to_employer: to,
                to_title,
                level: crate::classifier::AlertLevel::from_priority(level)?,
                signals: serde_json::from_str(&signals).unwrap_or_default(),
                detected_at: parse_timestamp(&detected)?,
            });
        }

        Ok(events)
    }

    pub fn departure_counts_by_level(&self) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT alert_level, COUNT(*) FROM departures
             GROUP BY alert_level ORDER BY alert_level DESC",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const PERSON_COLUMNS: &str = "id, full_name, employer_at_tracking_start, last_known_employer,
    employer_name, employer_size_bucket, employer_founded_year, title, headline,
    summary, profile_url, status, last_changed_at, tracking_started_at, last_checked_at";

fn row_to_person(row: &Row) -> rusqlite::Result<TrackedPerson> {
    let status_str: String = row.get(11)?;
    let last_changed: Option<String> = row.get(12)?;
    let started: String = row.get(13)?;
    let checked: String = row.get(14)?;

    Ok(TrackedPerson {
        id: row.get(0)?,
        full_name: row.get(1)?,
        employer_at_tracking_start: row.get(2)?,
        last_known_employer: row.get(3)?,
        current_snapshot: EmploymentSnapshot {
            employer_name: row.get(4)?,
            employer_size_bucket: row.get(5)?,
            employer_founded_year: row.get(6)?,
            title: row.get(7)?,
            headline: row.get(8)?,
            summary: row.get(9)?,
            profile_url: row.get(10)?,
        },
        status: PersonStatus::parse(&status_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, e.into())
        })?,
        last_changed_at: match last_changed {
            Some(s) => Some(parse_timestamp(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, e.into())
            })?),
            None => None,
        },
        tracking_started_at: parse_timestamp(&started).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, e.into())
        })?,
        last_checked_at: parse_timestamp(&checked).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, e.into())
        })?,
    })
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {}", s))?;
    Ok(dt.with_timezone(&Utc))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_person(id: &str, employer: &str) -> TrackedPerson {
        TrackedPerson::new(
            id.to_string(),
            format!("Person {}", id),
            employer.to_string(),
            EmploymentSnapshot {
                employer_name: employer.to_string(),
                employer_size_bucket: "10000+".to_string(),
                employer_founded_year: Some(1998),
                title: "Senior Engineer".to_string(),
                headline: String::new(),
                summary: String::new(),
                profile_url: format!("https://www.linkedin.com/in/{}", id),
            },
        )
    }

    #[test]
    fn test_normalize_employer_key() {
        assert_eq!(normalize_employer_key("OpenAI"), "openai");
        assert_eq!(
            normalize_employer_key("  Google   DeepMind  "),
            "google deepmind"
        );
        assert_eq!(normalize_employer_key(""), "");
    }

    #[test]
    fn test_insert_and_get_person() {
        let store = TrackingStore::open_in_memory().unwrap();
        let person = sample_person("p1", "OpenAI");

        assert!(store.insert_person(&person).unwrap());

        let loaded = store.get_person("p1").unwrap();
        assert_eq!(loaded.full_name, "Person p1");
        assert_eq!(loaded.employer_at_tracking_start, "OpenAI");
        assert_eq!(loaded.last_known_employer, "OpenAI");
        assert_eq!(loaded.status, PersonStatus::Active);
        assert!(loaded.last_changed_at.is_none());
    }

    #[test]
    fn test_insert_existing_person_is_not_added_twice() {
        let store = TrackingStore::open_in_memory().unwrap();
        let person = sample_person("p1", "OpenAI");

        assert!(store.insert_person(&person).unwrap());
        assert!(!store.insert_person(&person).unwrap());

        assert_eq!(store.count_by_status(PersonStatus::Active).unwrap(), 1);
    }

    #[test]
    fn test_get_unknown_person_is_not_found() {
        let store = TrackingStore::open_in_memory().unwrap();

        let err = store.get_person("ghost").unwrap_err();
        assert!(err.downcast_ref::<NotFound>().is_some());
    }

    #[test]
    fn test_save_person_updates_mutable_fields() {
        let store = TrackingStore::open_in_memory().unwrap();
        let mut person = sample_person("p1", "OpenAI");
        store.insert_person(&person).unwrap();

        person.status = PersonStatus::Departed;
        person.last_known_employer = "Microsoft".to_string();
        person.current_snapshot.employer_name = "Microsoft".to_string();
        person.last_changed_at = Some(Utc::now());
        store.save_person(&person).unwrap();

        let loaded = store.get_person("p1").unwrap();
        assert_eq!(loaded.status, PersonStatus::Departed);
        assert_eq!(loaded.last_known_employer, "Microsoft");
        assert!(loaded.last_changed_at.is_some());
        // immutable once set
        assert_eq!(loaded.employer_at_tracking_start, "OpenAI");
    }

    #[test]
    fn test_person_ids_for_employer_includes_all_statuses() {
        let store = TrackingStore::open_in_memory().unwrap();

        store.insert_person(&sample_person("p1", "OpenAI")).unwrap();
        store.insert_person(&sample_person("p2", "OpenAI")).unwrap();
        store
            .insert_person(&sample_person("p3", "Anthropic"))
            .unwrap();
        store.set_status("p2", PersonStatus::Removed).unwrap();

        let mut ids = store.person_ids_for_employer("openai").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn test_snapshot_hash_changes_with_employer() {
        let person = sample_person("p1", "OpenAI");
        let mut moved = person.current_snapshot.clone();
        moved.employer_name = "Microsoft".to_string();

        assert_ne!(person.current_snapshot.data_hash(), moved.data_hash());
        assert_eq!(
            person.current_snapshot.data_hash(),
            person.current_snapshot.data_hash()
        );
    }
}
