//! Profile data access object

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::database::{lock, parse_optional_timestamp, parse_timestamp, DatabaseError};
use super::models::{Profile, SuspensionStatus};
use crate::extract::IdentityFields;
use crate::swap::{CaptureReport, Namespace, ProfileRecorder, RecorderError, RestoreReport};

const PROFILE_COLUMNS: &str = "id, name, namespace, user_id, advertising_id, install_id, ssaid, device_token, digest, extended, suspension, has_error, note, created_at, updated_at, last_played, deleted_at, suspension_count";

/// Data access object for Profile records
#[derive(Clone)]
pub struct ProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProfileStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a profile and return it with its assigned id
    pub fn create(&self, profile: &Profile) -> Result<Profile, DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO profiles (name, namespace, user_id, advertising_id, install_id, ssaid, device_token, digest, extended, suspension, has_error, note, created_at, updated_at, last_played, deleted_at, suspension_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                profile.name,
                profile.namespace.as_str(),
                profile.identity.user_id,
                profile.identity.advertising_id,
                profile.identity.install_id,
                profile.identity.ssaid,
                profile.identity.device_token,
                profile.digest,
                profile.extended as i32,
                profile.suspension.as_str(),
                profile.has_error as i32,
                profile.note,
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
                profile.last_played.map(|t| t.to_rfc3339()),
                profile.deleted_at.map(|t| t.to_rfc3339()),
                profile.suspension_count,
            ],
        )?;
        Ok(profile.clone().with_id(conn.last_insert_rowid()))
    }

    /// Get a profile by ID, including deleted ones
    pub fn get(&self, id: i64) -> Result<Option<Profile>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let profile = conn
            .query_row(
                &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
                params![id],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Get a profile by namespace and name, including deleted ones
    pub fn find_by_name(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> Result<Option<Profile>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let profile = conn
            .query_row(
                &format!(
                    "SELECT {} FROM profiles WHERE namespace = ?1 AND name = ?2",
                    PROFILE_COLUMNS
                ),
                params![namespace.as_str(), name],
                Self::row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Active profiles, optionally limited to one namespace, sorted by name
    pub fn list(&self, namespace: Option<Namespace>) -> Result<Vec<Profile>, DatabaseError> {
        self.query_list("deleted_at IS NULL", namespace)
    }

    /// Profiles in the trash
    pub fn list_deleted(&self) -> Result<Vec<Profile>, DatabaseError> {
        self.query_list("deleted_at IS NOT NULL", None)
    }

    fn query_list(
        &self,
        filter: &str,
        namespace: Option<Namespace>,
    ) -> Result<Vec<Profile>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles WHERE {} AND (?1 IS NULL OR namespace = ?1) ORDER BY namespace, name",
            PROFILE_COLUMNS, filter
        ))?;
        let profiles = stmt
            .query_map(params![namespace.map(|ns| ns.as_str())], Self::row_to_profile)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(profiles)
    }

    /// Replace identity fields and capture metadata after a capture
    pub fn update_capture(
        &self,
        id: i64,
        identity: &IdentityFields,
        digest: &str,
        extended: bool,
    ) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET user_id = ?2, advertising_id = ?3, install_id = ?4, ssaid = ?5, device_token = ?6, digest = ?7, extended = ?8, updated_at = ?9, deleted_at = NULL
             WHERE id = ?1",
            params![
                id,
                identity.user_id,
                identity.advertising_id,
                identity.install_id,
                identity.ssaid,
                identity.device_token,
                digest,
                extended as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        ensure_changed(changed, id)
    }

    /// Record that the profile was restored into the live slot
    pub fn touch_last_played(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET last_played = ?2 WHERE id = ?1",
            params![id, at.to_rfc3339()],
        )?;
        ensure_changed(changed, id)
    }

    /// Record a suspension status. Moving into a different suspended state bumps the count.
    pub fn set_suspension(&self, id: i64, status: SuspensionStatus) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET
                 suspension_count = suspension_count + CASE WHEN ?3 AND suspension <> ?2 THEN 1 ELSE 0 END,
                 suspension = ?2,
                 updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                status.is_suspended(),
                Utc::now().to_rfc3339()
            ],
        )?;
        ensure_changed(changed, id)
    }

    pub fn set_error(&self, id: i64, has_error: bool) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET has_error = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, has_error as i32, Utc::now().to_rfc3339()],
        )?;
        ensure_changed(changed, id)
    }

    pub fn set_note(&self, id: i64, note: Option<&str>) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET note = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, note, Utc::now().to_rfc3339()],
        )?;
        ensure_changed(changed, id)
    }

    /// Move a profile to the trash. The stored snapshot is left alone.
    pub fn soft_delete(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, Utc::now().to_rfc3339()],
        )?;
        ensure_changed(changed, id)
    }

    /// Bring a profile back from the trash
    pub fn undelete(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE profiles SET deleted_at = NULL WHERE id = ?1",
            params![id],
        )?;
        ensure_changed(changed, id)
    }

    /// Permanently remove trashed profiles deleted before `cutoff`
    pub fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM profiles WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    /// Convert a database row to a Profile
    fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let namespace_raw: String = row.get(2)?;
        let suspension_raw: String = row.get(10)?;

        Ok(Profile {
            id: row.get(0)?,
            name: row.get(1)?,
            namespace: namespace_raw.parse().unwrap_or(Namespace::Own),
            identity: IdentityFields {
                user_id: row.get(3)?,
                advertising_id: row.get(4)?,
                install_id: row.get(5)?,
                ssaid: row.get(6)?,
                device_token: row.get(7)?,
            },
            digest: row.get(8)?,
            extended: row.get::<_, i32>(9)? != 0,
            suspension: suspension_raw.parse().unwrap_or_default(),
            has_error: row.get::<_, i32>(11)? != 0,
            note: row.get(12)?,
            created_at: parse_timestamp(row, 13)?,
            updated_at: parse_timestamp(row, 14)?,
            last_played: parse_optional_timestamp(row, 15)?,
            deleted_at: parse_optional_timestamp(row, 16)?,
            suspension_count: row.get(17)?,
        })
    }
}

fn ensure_changed(changed: usize, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        Err(DatabaseError::NotFound {
            entity: "profile",
            id,
        })
    } else {
        Ok(())
    }
}

impl ProfileRecorder for ProfileStore {
    fn record_capture(&self, report: &CaptureReport) -> Result<(), RecorderError> {
        let extended = report.archive_path.is_some();
        let existing = self
            .find_by_name(report.namespace, &report.name)
            .map_err(|e| RecorderError(e.to_string()))?;
        let result = match existing {
            Some(profile) => {
                let identity = report.identity.clone().merged_over(&profile.identity);
                self.update_capture(profile.id, &identity, &report.digest, extended)
            }
            None => {
                let mut profile = Profile::new(&report.name, report.namespace);
                profile.identity = report.identity.clone();
                profile.digest = Some(report.digest.clone());
                profile.extended = extended;
                self.create(&profile).map(|_| ())
            }
        };
        result.map_err(|e| RecorderError(e.to_string()))
    }

    fn record_restore(&self, report: &RestoreReport) -> Result<(), RecorderError> {
        let existing = self
            .find_by_name(report.namespace, &report.name)
            .map_err(|e| RecorderError(e.to_string()))?;
        let id = match existing {
            Some(profile) => profile.id,
            None => self
                .create(&Profile::new(&report.name, report.namespace))
                .map_err(|e| RecorderError(e.to_string()))?
                .id,
        };
        self.touch_last_played(id, report.restored_at)
            .map_err(|e| RecorderError(e.to_string()))
    }
}
