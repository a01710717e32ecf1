//! Event data access object

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::database::{lock, parse_timestamp, DatabaseError};
use super::models::Event;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|value| NaiveDate::parse_from_str(&value, DATE_FORMAT).ok())
}

/// Data access object for Event records
#[derive(Clone)]
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert an event and return it with its assigned id
    pub fn create(&self, event: &Event) -> Result<Event, DatabaseError> {
        if let (Some(start), Some(end)) = (event.starts_on, event.ends_on) {
            if end < start {
                return Err(DatabaseError::Invalid(format!(
                    "event '{}' ends before it starts",
                    event.name
                )));
            }
        }
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO events (name, starts_on, ends_on, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.name,
                event.starts_on.map(|d| d.format(DATE_FORMAT).to_string()),
                event.ends_on.map(|d| d.format(DATE_FORMAT).to_string()),
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(event.clone().with_id(conn.last_insert_rowid()))
    }

    pub fn get(&self, id: i64) -> Result<Option<Event>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let event = conn
            .query_row(
                "SELECT id, name, starts_on, ends_on, created_at FROM events WHERE id = ?1",
                params![id],
                Self::row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    /// All events, most recent start first
    pub fn list(&self) -> Result<Vec<Event>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, name, starts_on, ends_on, created_at FROM events
             ORDER BY starts_on DESC, id DESC",
        )?;
        let events = stmt
            .query_map([], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Delete an event (cascades to its teams)
    pub fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        Ok(Event {
            id: row.get(0)?,
            name: row.get(1)?,
            starts_on: parse_date(row.get(2)?),
            ends_on: parse_date(row.get(3)?),
            created_at: parse_timestamp(row, 4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Database;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_get_with_dates() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let store = EventStore::new(db.connection());

        let start = NaiveDate::from_ymd_opt(2024, 6, 1);
        let end = NaiveDate::from_ymd_opt(2024, 6, 4);
        let event = store
            .create(&Event::new("Partner Event").with_dates(start, end))
            .unwrap();

        let loaded = store.get(event.id).unwrap().unwrap();
        assert_eq!(loaded.starts_on, start);
        assert_eq!(loaded.ends_on, end);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_inverted_dates() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let store = EventStore::new(db.connection());

        let err = store
            .create(&Event::new("Backwards").with_dates(
                NaiveDate::from_ymd_opt(2024, 6, 4),
                NaiveDate::from_ymd_opt(2024, 6, 1),
            ))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Invalid(_)));
    }
}
