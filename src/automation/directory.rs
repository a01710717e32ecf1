//! Read-only lookups the driver needs to turn slots into work items

use thiserror::Error;

use crate::data::{Customer, DatabaseError, Profile, Team};
use crate::extract::friend_link_user_id;
use crate::util::shell::is_numeric_id;

#[derive(Debug, Error)]
#[error("Directory lookup failed: {0}")]
pub struct DirectoryError(pub String);

impl From<DatabaseError> for DirectoryError {
    fn from(err: DatabaseError) -> Self {
        DirectoryError(err.to_string())
    }
}

/// Why a slot could not be turned into a runnable item
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Profile {0} not found")]
    ProfileNotFound(i64),

    #[error("Profile '{0}' is in the trash")]
    ProfileDeleted(String),

    #[error("Team has no customer")]
    NoCustomer,

    #[error("Customer {0} not found")]
    CustomerNotFound(i64),

    #[error("Customer '{0}' has no user id")]
    CustomerWithoutUserId(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Source of teams, profiles and customers
pub trait TeamDirectory: Send + Sync {
    /// Teams of an event in run order
    fn teams_for_event(&self, event_id: i64) -> Result<Vec<Team>, DirectoryError>;

    fn profile(&self, id: i64) -> Result<Option<Profile>, DirectoryError>;

    fn customer(&self, id: i64) -> Result<Option<Customer>, DirectoryError>;
}

/// Look up an active profile
pub fn resolve_profile(
    directory: &dyn TeamDirectory,
    profile_id: i64,
) -> Result<Profile, ResolutionError> {
    let profile = directory
        .profile(profile_id)?
        .ok_or(ResolutionError::ProfileNotFound(profile_id))?;
    if profile.is_deleted() {
        return Err(ResolutionError::ProfileDeleted(profile.name));
    }
    Ok(profile)
}

/// Look up the team's customer and the user id friend links are sent to
pub fn resolve_customer(
    directory: &dyn TeamDirectory,
    customer_id: Option<i64>,
) -> Result<(Customer, String), ResolutionError> {
    let customer_id = customer_id.ok_or(ResolutionError::NoCustomer)?;
    let customer = directory
        .customer(customer_id)?
        .ok_or(ResolutionError::CustomerNotFound(customer_id))?;
    let user_id = customer
        .user_id
        .clone()
        .filter(|id| is_numeric_id(id))
        .or_else(|| customer.friend_link.as_deref().and_then(friend_link_user_id));
    match user_id {
        Some(user_id) => Ok((customer, user_id)),
        None => Err(ResolutionError::CustomerWithoutUserId(customer.name)),
    }
}
