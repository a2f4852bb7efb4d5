// 🎯 Employer Target Registry - durable per-employer target counts
// Central invariant: target_count changes ONLY via set_target or first-ever
// creation of the record. The count-update path must never overwrite it -
// a whole-row upsert here is the exact defect this module exists to prevent.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::db::{normalize_employer_key, NotFound};

// ============================================================================
// EMPLOYER TARGET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployerTarget {
    /// Normalized employer name
    pub employer_key: String,

    /// Count of persons occupying tracking slots. Owned by the
    /// reconciliation path, never negative.
    pub tracked_count: i64,

    /// User-configured target. 0 disables reconciliation for this employer.
    pub target_count: i64,

    pub last_updated: DateTime<Utc>,
}

impl EmployerTarget {
    pub fn deficit(&self) -> i64 {
        (self.target_count - self.tracked_count).max(0)
    }
}

// ============================================================================
// INVALID TARGET
// ============================================================================

/// Explicit out-of-range target value from the user configuration path
#[derive(Debug, Clone)]
pub struct InvalidTarget {
    pub employer: String,
    pub value: i64,
}

impl std::fmt::Display for InvalidTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid target count {} for employer '{}': must be >= 0",
            self.value, self.employer
        )
    }
}

impl std::error::Error for InvalidTarget {}

// ============================================================================
// REGISTRY
// ============================================================================

/// Registry of per-employer tracked/target counts, backed by the
/// employer_targets table. Every mutation runs as a single SQL statement (or
/// statement pair) under the shared connection lock, so read-modify-write on
/// the counters is linearized across callers.
#[derive(Clone)]
pub struct EmployerTargetRegistry {
    conn: Arc<Mutex<Connection>>,
    default_target: i64,
}

impl EmployerTargetRegistry {
    pub fn new(conn: Arc<Mutex<Connection>>, default_target: i64) -> Self {
        EmployerTargetRegistry {
            conn,
            default_target,
        }
    }

    /// Return the stored record, creating it with the default target only if
    /// absent. An existing record is returned unchanged.
    pub fn get_or_create(&self, employer: &str) -> Result<EmployerTarget> {
        let key = normalize_employer_key(employer);
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO employer_targets (employer_key, tracked_count, target_count, last_updated)
             VALUES (?1, 0, ?2, ?3)
             ON CONFLICT(employer_key) DO NOTHING",
            params![key, self.default_target, Utc::now().to_rfc3339()],
        )?;

        let target = Self::select(&conn, &key)?;
        target.ok_or_else(|| {
            NotFound {
                entity: "employer",
                key,
            }
            .into()
        })
    }

    pub fn get(&self, employer: &str) -> Result<Option<EmployerTarget>> {
        let key = normalize_employer_key(employer);
        let conn = self.conn.lock().unwrap();
        Self::select(&conn, &key)
    }

    /// Explicit user action - the ONLY path besides first creation that is
    /// allowed to change target_count.
    pub fn set_target(&self, employer: &str, new_target: i64) -> Result<()> {
        if new_target < 0 {
            return Err(InvalidTarget {
                employer: employer.to_string(),
                value: new_target,
            }
            .into());
        }

        let key = normalize_employer_key(employer);
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO employer_targets (employer_key, tracked_count, target_count, last_updated)
             VALUES (?1, 0, ?2, ?3)
             ON CONFLICT(employer_key) DO UPDATE SET
                 target_count = excluded.target_count,
                 last_updated = excluded.last_updated",
            params![key, new_target, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Increment tracked_count after persons were added for an employer.
    ///
    /// Two-path upsert: create-with-default-target if the record is absent,
    /// otherwise update the count column ONLY. target_count is untouched on
    /// the update path.
    pub fn record_addition(&self, employer: &str, added_count: i64) -> Result<()> {
        if added_count <= 0 {
            return Ok(());
        }

        let key = normalize_employer_key(employer);
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO employer_targets (employer_key, tracked_count, target_count, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(employer_key) DO UPDATE SET
                 tracked_count = tracked_count + excluded.tracked_count,
                 last_updated = excluded.last_updated",
            params![key, added_count, self.default_target, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Decrement tracked_count by one, floored at 0, and return the resulting
    /// (tracked_count, target_count) pair. Both statements run under one lock
    /// acquisition, so the caller decides on reconciliation without a race
    /// between read and decrement.
    pub fn record_removal(&self, employer: &str) -> Result<(i64, i64)> {
        let key = normalize_employer_key(employer);
        let conn = self.conn.lock().unwrap();

        let changed = conn.execute(
            "UPDATE employer_targets
             SET tracked_count = MAX(tracked_count - 1, 0), last_updated = ?1
             WHERE employer_key = ?2",
            params![Utc::now().to_rfc3339(), key],
        )?;

        if changed == 0 {
            return Err(NotFound {
                entity: "employer",
                key,
            }
            .into());
        }

        let target = Self::select(&conn, &key)?.ok_or_else(|| NotFound {
            entity: "employer",
            key,
        })?;

        Ok((target.tracked_count, target.target_count))
    }

    pub fn all_targets(&self) -> Result<Vec<EmployerTarget>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT employer_key, tracked_count, target_count, last_updated
             FROM employer_targets
             ORDER BY employer_key",
        )?;

        let targets = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(targets.len());
        for (employer_key, tracked_count, target_count, updated) in targets {
            result.push(EmployerTarget {
                employer_key,
                tracked_count,
                target_count,
                last_updated: crate::db::parse_timestamp(&updated)?,
            });
        }

        Ok(result)
    }

    fn select(conn: &Connection, key: &str) -> Result<Option<EmployerTarget>> {
        let row = conn
            .query_row(
                "SELECT employer_key, tracked_count, target_count, last_updated
                 FROM employer_targets WHERE employer_key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((employer_key, tracked_count, target_count, updated)) => Ok(Some(EmployerTarget {
                employer_key,
                tracked_count,
                target_count,
                last_updated: crate::db::parse_timestamp(&updated)?,
            })),
            None => Ok(None),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
