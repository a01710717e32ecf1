//! Activity log data access object

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use super::database::{lock, parse_timestamp, DatabaseError};
use super::models::ActivityEntry;

/// Append-only store for activity entries
#[derive(Clone)]
pub struct ActivityStore {
    conn: Arc<Mutex<Connection>>,
}

impl ActivityStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn append(&self, entry: &ActivityEntry) -> Result<ActivityEntry, DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO activity_log (kind, category, description, profile_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.kind,
                entry.category,
                entry.description,
                entry.profile_id,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(entry.clone().with_id(conn.last_insert_rowid()))
    }

    /// Newest entries first
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, category, description, profile_id, created_at
             FROM activity_log ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Entries for one profile, newest first
    pub fn for_profile(&self, profile_id: i64) -> Result<Vec<ActivityEntry>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, category, description, profile_id, created_at
             FROM activity_log WHERE profile_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let entries = stmt
            .query_map(params![profile_id], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<ActivityEntry> {
        Ok(ActivityEntry {
            id: row.get(0)?,
            kind: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            profile_id: row.get(4)?,
            created_at: parse_timestamp(row, 5)?,
        })
    }
}
