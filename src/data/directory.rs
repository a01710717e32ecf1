//! SQLite-backed lookups for automation runs

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::customer::CustomerStore;
use super::models::{Customer, Profile, Team};
use super::profile::ProfileStore;
use super::team::TeamStore;
use crate::automation::{DirectoryError, TeamDirectory};

pub struct SqliteDirectory {
    profiles: ProfileStore,
    customers: CustomerStore,
    teams: TeamStore,
}

impl SqliteDirectory {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            profiles: ProfileStore::new(conn.clone()),
            customers: CustomerStore::new(conn.clone()),
            teams: TeamStore::new(conn),
        }
    }
}

impl TeamDirectory for SqliteDirectory {
    fn teams_for_event(&self, event_id: i64) -> Result<Vec<Team>, DirectoryError> {
        Ok(self.teams.list_for_event(event_id)?)
    }

    fn profile(&self, id: i64) -> Result<Option<Profile>, DirectoryError> {
        Ok(self.profiles.get(id)?)
    }

    fn customer(&self, id: i64) -> Result<Option<Customer>, DirectoryError> {
        Ok(self.customers.get(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{resolve_customer, resolve_profile, ResolutionError};
    use crate::data::{Database, Event, EventStore};
    use crate::swap::Namespace;
    use tempfile::tempdir;

    #[test]
    fn test_resolves_team_from_database() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let event = EventStore::new(db.connection())
            .create(&Event::new("Race"))
            .unwrap();
        let customer = CustomerStore::new(db.connection())
            .create(&Customer::new("carol").with_friend_link("https://mply.io/add-friend/778899"))
            .unwrap();
        let profile = ProfileStore::new(db.connection())
            .create(&Profile::new("alpha", Namespace::Customer))
            .unwrap();
        TeamStore::new(db.connection())
            .create(
                &Team::new(event.id, "A")
                    .with_customer(customer.id)
                    .with_slot(2, profile.id),
            )
            .unwrap();

        let directory = SqliteDirectory::new(db.connection());
        let teams = directory.teams_for_event(event.id).unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].slots[1], Some(profile.id));

        let resolved = resolve_profile(&directory, profile.id).unwrap();
        assert_eq!(resolved.name, "alpha");
        let (_, user_id) = resolve_customer(&directory, teams[0].customer_id).unwrap();
        assert_eq!(user_id, "778899");
    }

    #[test]
    fn test_trashed_profile_is_not_runnable() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let store = ProfileStore::new(db.connection());
        let profile = store.create(&Profile::new("beta", Namespace::Own)).unwrap();
        store.soft_delete(profile.id).unwrap();

        let directory = SqliteDirectory::new(db.connection());
        assert!(matches!(
            resolve_profile(&directory, profile.id),
            Err(ResolutionError::ProfileDeleted(name)) if name == "beta"
        ));
        assert!(matches!(
            resolve_profile(&directory, 999),
            Err(ResolutionError::ProfileNotFound(999))
        ));
    }
}
