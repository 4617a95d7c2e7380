//! Refresh token rotation.
//!
//! Exchanges a presented refresh token for a new pair:
//!
//! 1. Resolve the owning user id from `refresh:<token>`. A miss is final,
//!    since refresh tokens have no durable record.
//! 2. Resolve the user from the `user:` snapshot, falling back to the durable
//!    user store on a miss.
//! 3. Issue the replacement pair through the [`TokenIssuer`].
//! 4. Retire the presented token.
//!
//! # Rotation modes
//!
//! In [`RotationMode::Detached`] the presented token is deleted by a detached
//! task scheduled after the issuer has scheduled the successor's writes.
//! Until that delete lands, a concurrent rotation of the same token can also
//! succeed, yielding more than one live successor session.
//!
//! In [`RotationMode::Atomic`] step 1 reads and deletes the mapping in a
//! single cache operation, so exactly one of several concurrent rotations of
//! the same token succeeds.

use crate::cache::{CacheError, SessionStore};
use crate::errors::SessionError;
use crate::models::{TokenPair, User};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{
    record_token_issuance, record_token_rotation, record_user_store_fallback,
};
use crate::repositories::UserRepository;
use crate::services::token_service::TokenIssuer;
use crate::tasks::DetachedTasks;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Task name for retiring a rotated refresh token.
pub const REVOKE_REFRESH_TOKEN_TASK: &str = "revoke_refresh_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// Look up, then delete in a detached task.
    #[default]
    Detached,
    /// Look up and delete in one cache operation.
    Atomic,
}

impl RotationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationMode::Detached => "detached",
            RotationMode::Atomic => "atomic",
        }
    }
}

impl FromStr for RotationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detached" => Ok(RotationMode::Detached),
            "atomic" => Ok(RotationMode::Atomic),
            other => Err(format!(
                "unknown rotation mode '{other}' (expected 'detached' or 'atomic')"
            )),
        }
    }
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RefreshRotator {
    issuer: Arc<TokenIssuer>,
    sessions: SessionStore,
    users: Arc<dyn UserRepository>,
    tasks: DetachedTasks,
    mode: RotationMode,
}

impl RefreshRotator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        sessions: SessionStore,
        users: Arc<dyn UserRepository>,
        tasks: DetachedTasks,
        mode: RotationMode,
    ) -> Self {
        Self {
            issuer,
            sessions,
            users,
            tasks,
            mode,
        }
    }

    /// Exchange `refresh_token` for a new token pair.
    ///
    /// # Errors
    ///
    /// - `RefreshTokenNotFound` if the token is unknown, expired, or already
    ///   retired
    /// - `UserNotFound` if the owner is in neither the cache nor the store
    /// - `Cache` / `Database` on infrastructure failure
    /// - `Signing` if the replacement access token cannot be signed
    #[instrument(skip_all, fields(mode = %self.mode))]
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let result = self.rotate_inner(refresh_token).await;
        record_token_rotation(rotation_status(&result));
        result
    }

    async fn rotate_inner(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        if refresh_token.is_empty() {
            return Err(SessionError::RefreshTokenNotFound);
        }
        let token_hash = hash_for_correlation(refresh_token);

        let owner = match self.mode {
            RotationMode::Detached => self.sessions.refresh_owner(refresh_token).await,
            RotationMode::Atomic => self.sessions.take_refresh_owner(refresh_token).await,
        }
        .map_err(|e| SessionError::cache("resolve refresh token", e))?;

        let Some(user_id) = owner else {
            debug!(
                target: "session.rotation",
                refresh_token = %token_hash,
                "Refresh token not found"
            );
            return Err(SessionError::RefreshTokenNotFound);
        };

        let user = self.resolve_user(user_id).await?;

        let start = Instant::now();
        let issued = self.issuer.issue(&user);
        record_token_issuance(
            "refresh",
            if issued.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );
        let pair = issued?;

        if self.mode == RotationMode::Detached {
            let sessions = self.sessions.clone();
            let old_token = refresh_token.to_string();
            self.tasks.spawn(REVOKE_REFRESH_TOKEN_TASK, async move {
                sessions.revoke_refresh_token(&old_token).await
            });
        }

        info!(
            target: "session.rotation",
            user_id = %user.id,
            refresh_token = %token_hash,
            successor = %hash_for_correlation(&pair.refresh_token),
            "Refresh token rotated"
        );

        Ok(pair)
    }

    /// Cache-aside read of the token owner.
    async fn resolve_user(&self, user_id: Uuid) -> Result<User, SessionError> {
        match self.sessions.cached_user(user_id).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            // An unreadable snapshot is replaced by the issuer's next write.
            Err(CacheError::Serialization(e)) => {
                warn!(
                    target: "session.rotation",
                    user_id = %user_id,
                    error = %e,
                    "Discarding malformed user snapshot"
                );
            }
            Err(e) => return Err(SessionError::cache("resolve user snapshot", e)),
        }

        match self.users.get_user_by_id(user_id).await {
            Ok(Some(user)) => {
                record_user_store_fallback("found");
                debug!(target: "session.rotation", user_id = %user_id, "User loaded from store");
                Ok(user)
            }
            Ok(None) => {
                record_user_store_fallback("not_found");
                warn!(
                    target: "session.rotation",
                    user_id = %user_id,
                    "Refresh token owner missing from user store"
                );
                Err(SessionError::UserNotFound)
            }
            Err(e) => {
                record_user_store_fallback("error");
                Err(e)
            }
        }
    }
}

fn rotation_status(result: &Result<TokenPair, SessionError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(SessionError::RefreshTokenNotFound) => "not_found",
        Err(SessionError::UserNotFound) => "user_not_found",
        Err(_) => "error",
    }
}
