//! Data models for profiles, customers, events and teams

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::extract::{friend_link_user_id, IdentityFields};
use crate::swap::Namespace;

/// Number of slots on a team
pub const TEAM_SLOTS: usize = 4;

/// Default number of slots a customer books
pub const DEFAULT_CUSTOMER_SLOTS: u8 = 4;

/// Game-side suspension state recorded by the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuspensionStatus {
    #[default]
    None,
    ThreeDays,
    SevenDays,
    Permanent,
}

impl SuspensionStatus {
    /// Storage form
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionStatus::None => "0",
            SuspensionStatus::ThreeDays => "3",
            SuspensionStatus::SevenDays => "7",
            SuspensionStatus::Permanent => "perm",
        }
    }

    pub fn is_suspended(&self) -> bool {
        !matches!(self, SuspensionStatus::None)
    }
}

impl fmt::Display for SuspensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuspensionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(SuspensionStatus::None),
            "3" => Ok(SuspensionStatus::ThreeDays),
            "7" => Ok(SuspensionStatus::SevenDays),
            "perm" | "permanent" => Ok(SuspensionStatus::Permanent),
            other => Err(format!("unknown suspension status '{}'", other)),
        }
    }
}

/// A captured identity state, addressed by name within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Assigned by the store; 0 until persisted
    pub id: i64,
    pub name: String,
    pub namespace: Namespace,
    pub identity: IdentityFields,
    /// Hex SHA-256 of the last captured primary file
    pub digest: Option<String>,
    /// Whether the last capture included the auxiliary archive
    pub extended: bool,
    pub suspension: SuspensionStatus,
    /// Times the profile has entered a suspended state
    pub suspension_count: u32,
    pub has_error: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time this profile was restored into the live slot
    pub last_played: Option<DateTime<Utc>>,
    /// When the profile was moved to the trash (None = active)
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(name: impl Into<String>, namespace: Namespace) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            namespace,
            identity: IdentityFields::default(),
            digest: None,
            extended: false,
            suspension: SuspensionStatus::None,
            suspension_count: 0,
            has_error: false,
            note: None,
            created_at: now,
            updated_at: now,
            last_played: None,
            deleted_at: None,
        }
    }

    /// The same record carrying its assigned id
    pub fn with_id(self, id: i64) -> Self {
        Self { id, ..self }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Friend link for this profile's own user id
    pub fn friend_link(&self, scheme: &str) -> Option<String> {
        self.identity
            .user_id
            .as_deref()
            .map(|id| crate::extract::friend_link(scheme, id))
    }
}

/// Someone whose account receives friend links from team slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub friend_link: Option<String>,
    pub friend_code: Option<String>,
    pub user_id: Option<String>,
    pub slots: u8,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            friend_link: None,
            friend_code: None,
            user_id: None,
            slots: DEFAULT_CUSTOMER_SLOTS,
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// Set the friend link; the user id is taken from it unless already known
    pub fn with_friend_link(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        if self.user_id.is_none() {
            self.user_id = friend_link_user_id(&link);
        }
        self.friend_link = Some(link);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_id(self, id: i64) -> Self {
        Self { id, ..self }
    }
}

/// A time-boxed game event that teams are organised for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            starts_on: None,
            ends_on: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_dates(mut self, starts_on: Option<NaiveDate>, ends_on: Option<NaiveDate>) -> Self {
        self.starts_on = starts_on;
        self.ends_on = ends_on;
        self
    }

    pub fn with_id(self, id: i64) -> Self {
        Self { id, ..self }
    }
}

/// Ordered slot assignment for one customer within an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub customer_id: Option<i64>,
    /// Profile ids, slot 1 first
    pub slots: [Option<i64>; TEAM_SLOTS],
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(event_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            event_id,
            name: name.into(),
            customer_id: None,
            slots: [None; TEAM_SLOTS],
            created_at: Utc::now(),
        }
    }

    pub fn with_customer(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Assign `profile_id` to a 1-based slot; out-of-range slots are ignored
    pub fn with_slot(mut self, slot: usize, profile_id: i64) -> Self {
        if let Some(entry) = slot.checked_sub(1).and_then(|i| self.slots.get_mut(i)) {
            *entry = Some(profile_id);
        }
        self
    }

    pub fn with_id(self, id: i64) -> Self {
        Self { id, ..self }
    }

    pub fn filled_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Append-only record of a completed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    /// What happened (`capture`, `restore`, `run-event`, ...)
    pub kind: String,
    /// Grouping for display (`profile`, `customer`, `automation`, ...)
    pub category: String,
    pub description: String,
    pub profile_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        kind: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            kind: kind.into(),
            category: category.into(),
            description: description.into(),
            profile_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_profile(mut self, profile_id: i64) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    pub fn with_id(self, id: i64) -> Self {
        Self { id, ..self }
    }
}
