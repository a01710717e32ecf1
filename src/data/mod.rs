//! Data persistence layer for slotswap
//!
//! SQLite-backed storage for profiles, customers, events, teams and the
//! activity log.

mod activity;
mod customer;
mod database;
mod directory;
mod event;
mod migrations;
mod models;
mod profile;
mod team;

pub use activity::ActivityStore;
pub use customer::CustomerStore;
pub use database::{Database, DatabaseError};
pub use directory::SqliteDirectory;
pub use event::EventStore;
pub use models::{
    ActivityEntry, Customer, Event, Profile, SuspensionStatus, Team, DEFAULT_CUSTOMER_SLOTS,
    TEAM_SLOTS,
};
pub use profile::ProfileStore;
pub use team::TeamStore;
