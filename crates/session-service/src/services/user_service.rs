//! User management.
//!
//! Listing and lookup are open to any authenticated caller. Updating or
//! deleting an account is self-only; the administrative update is limited to
//! `admin` and `super-admin` callers and may change roles.
//!
//! Every successful write overwrites or evicts the `user:<id>` snapshot, so
//! rotation does not keep minting tokens from a stale or deleted record.

use crate::cache::SessionStore;
use crate::crypto::{self, AccessClaims};
use crate::errors::SessionError;
use crate::models::{
    ListUsersQuery, PrivateUserUpdateRequest, Role, SortDirection, User, UserChanges,
    UserFilter, UserOrder, UserUpdateRequest,
};
use crate::repositories::UserRepository;
use crate::services::auth_service::{required_field, validate_email};
use std::str::FromStr;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Validate listing parameters, applying defaults for absent ones.
pub fn user_filter(query: &ListUsersQuery) -> Result<UserFilter, SessionError> {
    let limit = match query.limit.as_deref() {
        Some(raw) => parse_number("limit", raw)?,
        None => DEFAULT_PAGE_LIMIT,
    };
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(SessionError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }

    let offset = match query.offset.as_deref() {
        Some(raw) => parse_number("offset", raw)?,
        None => 0,
    };

    let sort = match query.sort.as_deref() {
        Some(raw) => SortDirection::from_str(raw).map_err(SessionError::Validation)?,
        None => SortDirection::default(),
    };
    let order = match query.order.as_deref() {
        Some(raw) => UserOrder::from_str(raw).map_err(SessionError::Validation)?,
        None => UserOrder::default(),
    };
    let role = query
        .role
        .as_deref()
        .map(Role::from_str)
        .transpose()
        .map_err(SessionError::Validation)?;

    Ok(UserFilter {
        role,
        sort,
        order,
        limit,
        offset,
    })
}

fn parse_number(name: &str, raw: &str) -> Result<u32, SessionError> {
    raw.trim()
        .parse()
        .map_err(|_| SessionError::Validation(format!("{name} must be a non-negative integer")))
}

#[instrument(skip_all)]
pub async fn list_users(
    users: &dyn UserRepository,
    query: &ListUsersQuery,
) -> Result<Vec<User>, SessionError> {
    let filter = user_filter(query)?;
    users.list_users(&filter).await
}

#[instrument(skip_all, fields(user_id = %id))]
pub async fn get_user(users: &dyn UserRepository, id: Uuid) -> Result<User, SessionError> {
    users.get_user_by_id(id).await?.ok_or(SessionError::UserNotFound)
}

/// Update the caller's own account.
#[instrument(skip_all, fields(user_id = %target))]
pub async fn update_self(
    users: &dyn UserRepository,
    sessions: &SessionStore,
    caller: &AccessClaims,
    target: Uuid,
    request: UserUpdateRequest,
    bcrypt_cost: u32,
) -> Result<User, SessionError> {
    require_self(caller, target, "update")?;

    let password_hash = match request.password.as_deref() {
        Some(password) if password.trim().is_empty() => {
            return Err(SessionError::Validation(
                "password must not be empty".to_string(),
            ));
        }
        Some(password) => Some(crypto::hash_password(password, bcrypt_cost)?),
        None => None,
    };
    let changes = UserChanges {
        name: optional_field("name", request.name.as_deref())?,
        surname: optional_field("surname", request.surname.as_deref())?,
        email: request.email.as_deref().map(validate_email).transpose()?,
        password_hash,
        role: None,
    };

    let user = apply(users, target, &changes).await?;
    refresh_snapshot(sessions, &user).await;

    info!(target: "session.users", user_id = %user.id, "User updated");
    Ok(user)
}

/// Delete the caller's own account.
///
/// Refresh tokens already issued for the account stop rotating once the
/// snapshot is gone, since the store no longer has the owner.
#[instrument(skip_all, fields(user_id = %target))]
pub async fn delete_self(
    users: &dyn UserRepository,
    sessions: &SessionStore,
    caller: &AccessClaims,
    target: Uuid,
) -> Result<(), SessionError> {
    require_self(caller, target, "delete")?;

    if !users.delete_user(target).await? {
        return Err(SessionError::UserNotFound);
    }
    if let Err(e) = sessions.evict_user(target).await {
        warn!(
            target: "session.users",
            user_id = %target,
            error = %e,
            "Failed to evict user snapshot, stale until expiry"
        );
    }

    info!(target: "session.users", user_id = %target, "User deleted");
    Ok(())
}

/// Update any user, including role. Admin and super-admin only.
#[instrument(skip_all, fields(user_id = %target))]
pub async fn update_as_admin(
    users: &dyn UserRepository,
    sessions: &SessionStore,
    caller: &AccessClaims,
    target: Uuid,
    request: PrivateUserUpdateRequest,
) -> Result<User, SessionError> {
    if caller.role != Role::Admin && caller.role != Role::SuperAdmin {
        warn!(
            target: "session.users",
            role = %caller.role,
            "Administrative update rejected"
        );
        return Err(SessionError::Forbidden(
            "administrator role required".to_string(),
        ));
    }
    if request.role == Some(Role::SuperAdmin) {
        return Err(SessionError::Validation(
            "role must be 'user' or 'admin'".to_string(),
        ));
    }

    let changes = UserChanges {
        name: optional_field("name", request.name.as_deref())?,
        surname: optional_field("surname", request.surname.as_deref())?,
        email: request.email.as_deref().map(validate_email).transpose()?,
        password_hash: None,
        role: request.role,
    };

    let user = apply(users, target, &changes).await?;
    refresh_snapshot(sessions, &user).await;

    info!(
        target: "session.users",
        user_id = %user.id,
        role = %user.role,
        "User updated by administrator"
    );
    Ok(user)
}

fn require_self(caller: &AccessClaims, target: Uuid, action: &str) -> Result<(), SessionError> {
    let caller_id = Uuid::parse_str(&caller.sub)
        .map_err(|_| SessionError::InvalidToken("subject is not a user id".to_string()))?;
    if caller_id != target {
        return Err(SessionError::Forbidden(format!(
            "users may only {action} their own account"
        )));
    }
    Ok(())
}

fn optional_field(field: &str, value: Option<&str>) -> Result<Option<String>, SessionError> {
    value.map(|v| required_field(field, v)).transpose()
}

async fn apply(
    users: &dyn UserRepository,
    target: Uuid,
    changes: &UserChanges,
) -> Result<User, SessionError> {
    if changes.is_empty() {
        return Err(SessionError::Validation(
            "at least one field must be provided".to_string(),
        ));
    }
    users
        .update_user(target, changes)
        .await?
        .ok_or(SessionError::UserNotFound)
}

/// The store is already updated; a cache failure here only leaves the old
/// snapshot in place until it expires.
async fn refresh_snapshot(sessions: &SessionStore, user: &User) {
    if let Err(e) = sessions.store_user(user).await {
        warn!(
            target: "session.users",
            user_id = %user.id,
            error = %e,
            "Failed to refresh user snapshot"
        );
        if let Err(e) = sessions.evict_user(user.id).await {
            warn!(
                target: "session.users",
                user_id = %user.id,
                error = %e,
                "Failed to evict user snapshot, stale until expiry"
            );
        }
    }
}
