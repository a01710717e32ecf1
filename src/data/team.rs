//! Team data access object

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::database::{lock, parse_timestamp, DatabaseError};
use super::models::{Team, TEAM_SLOTS};

const TEAM_COLUMNS: &str =
    "id, event_id, name, customer_id, slot_1, slot_2, slot_3, slot_4, created_at";

/// Data access object for Team records
#[derive(Clone)]
pub struct TeamStore {
    conn: Arc<Mutex<Connection>>,
}

impl TeamStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a team and return it with its assigned id
    pub fn create(&self, team: &Team) -> Result<Team, DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO teams (event_id, name, customer_id, slot_1, slot_2, slot_3, slot_4, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                team.event_id,
                team.name,
                team.customer_id,
                team.slots[0],
                team.slots[1],
                team.slots[2],
                team.slots[3],
                team.created_at.to_rfc3339(),
            ],
        )?;
        Ok(team.clone().with_id(conn.last_insert_rowid()))
    }

    pub fn get(&self, id: i64) -> Result<Option<Team>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let team = conn
            .query_row(
                &format!("SELECT {} FROM teams WHERE id = ?1", TEAM_COLUMNS),
                params![id],
                Self::row_to_team,
            )
            .optional()?;
        Ok(team)
    }

    /// Teams of an event in creation order
    pub fn list_for_event(&self, event_id: i64) -> Result<Vec<Team>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM teams WHERE event_id = ?1 ORDER BY id",
            TEAM_COLUMNS
        ))?;
        let teams = stmt
            .query_map(params![event_id], Self::row_to_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// Put a profile into a 1-based slot, or clear it with `None`
    pub fn assign_slot(
        &self,
        team_id: i64,
        slot: usize,
        profile_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        if !(1..=TEAM_SLOTS).contains(&slot) {
            return Err(DatabaseError::Invalid(format!(
                "slot {} out of range 1..={}",
                slot, TEAM_SLOTS
            )));
        }
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            &format!("UPDATE teams SET slot_{} = ?2 WHERE id = ?1", slot),
            params![team_id, profile_id],
        )?;
        ensure_changed(changed, team_id)
    }

    pub fn set_customer(&self, team_id: i64, customer_id: Option<i64>) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE teams SET customer_id = ?2 WHERE id = ?1",
            params![team_id, customer_id],
        )?;
        ensure_changed(changed, team_id)
    }

    pub fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM teams WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn row_to_team(row: &rusqlite::Row) -> rusqlite::Result<Team> {
        Ok(Team {
            id: row.get(0)?,
            event_id: row.get(1)?,
            name: row.get(2)?,
            customer_id: row.get(3)?,
            slots: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            created_at: parse_timestamp(row, 8)?,
        })
    }
}

fn ensure_changed(changed: usize, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        Err(DatabaseError::NotFound { entity: "team", id })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, Event, EventStore};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Database, TeamStore, i64) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let event = EventStore::new(db.connection())
            .create(&Event::new("Race"))
            .unwrap();
        let store = TeamStore::new(db.connection());
        (dir, db, store, event.id)
    }

    #[test]
    fn test_slots_round_trip_in_order() {
        let (_dir, _db, store, event_id) = setup();
        let first = store
            .create(&Team::new(event_id, "A").with_slot(2, 7))
            .unwrap();
        store.create(&Team::new(event_id, "B")).unwrap();

        store.assign_slot(first.id, 4, Some(9)).unwrap();
        store.assign_slot(first.id, 2, None).unwrap();

        let teams = store.list_for_event(event_id).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].name, "A");
        assert_eq!(teams[0].slots, [None, None, None, Some(9)]);
    }

    #[test]
    fn test_assign_slot_validates_range() {
        let (_dir, _db, store, event_id) = setup();
        let team = store.create(&Team::new(event_id, "A")).unwrap();
        assert!(matches!(
            store.assign_slot(team.id, 0, Some(1)),
            Err(DatabaseError::Invalid(_))
        ));
        assert!(matches!(
            store.assign_slot(team.id, 5, Some(1)),
            Err(DatabaseError::Invalid(_))
        ));
        assert!(matches!(
            store.assign_slot(999, 1, Some(1)),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_event_delete_cascades() {
        let (_dir, db, store, event_id) = setup();
        store.create(&Team::new(event_id, "A")).unwrap();
        EventStore::new(db.connection()).delete(event_id).unwrap();
        assert!(store.list_for_event(event_id).unwrap().is_empty());
    }
}
