//! Token issuer.
//!
//! Builds an access/refresh token pair for a user and schedules population of
//! the session cache as a detached task. Only signing can fail the call;
//! cache writes are best-effort and their failures are logged, never returned.

use crate::cache::{CacheError, SessionStore};
use crate::crypto::{self, AccessClaims, ACCESS_TOKEN_AUDIENCE};
use crate::errors::SessionError;
use crate::models::{TokenPair, User};
use crate::observability::hash_for_correlation;
use crate::tasks::DetachedTasks;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Task name for the refresh mapping + user snapshot writes.
pub const POPULATE_SESSION_TASK: &str = "populate_session";

pub struct TokenIssuer {
    secret: SecretString,
    access_ttl: Duration,
    sessions: SessionStore,
    tasks: DetachedTasks,
}

impl TokenIssuer {
    /// The secret is taken once here and never re-read from the environment.
    pub fn new(
        secret: SecretString,
        access_ttl: Duration,
        sessions: SessionStore,
        tasks: DetachedTasks,
    ) -> Self {
        Self {
            secret,
            access_ttl,
            sessions,
            tasks,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue a fresh token pair for `user`.
    ///
    /// Returns as soon as the tokens exist. The `refresh:` mapping and the
    /// `user:` snapshot are written afterwards in one detached task, in that
    /// order.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub fn issue(&self, user: &User) -> Result<TokenPair, SessionError> {
        let now = Utc::now().timestamp();
        let ttl_seconds = i64::try_from(self.access_ttl.as_secs()).map_err(|_| {
            SessionError::Signing("access token TTL out of range".to_string())
        })?;

        let claims = AccessClaims {
            sub: user.id.to_string(),
            aud: ACCESS_TOKEN_AUDIENCE.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token =
            crypto::sign_access_token(&claims, self.secret.expose_secret().as_bytes())?;
        let refresh_token = crypto::generate_refresh_token()?;

        let sessions = self.sessions.clone();
        let snapshot = user.clone();
        let token = refresh_token.clone();
        self.tasks.spawn(POPULATE_SESSION_TASK, async move {
            populate_session(&sessions, &token, &snapshot).await
        });

        debug!(
            target: "session.token",
            user_id = %user.id,
            refresh_token = %hash_for_correlation(&refresh_token),
            expires_at = claims.exp,
            "Issued token pair"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

/// Write the refresh mapping, then the user snapshot.
///
/// The snapshot is written even when the mapping fails.
async fn populate_session(
    sessions: &SessionStore,
    refresh_token: &str,
    user: &User,
) -> Result<(), CacheError> {
    let mapping = sessions.store_refresh_token(refresh_token, user.id).await;
    if let Err(e) = &mapping {
        warn!(
            target: "session.token",
            user_id = %user.id,
            refresh_token = %hash_for_correlation(refresh_token),
            error = %e,
            "Failed to cache refresh token"
        );
    }

    let snapshot = sessions.store_user(user).await;
    if let Err(e) = &snapshot {
        warn!(
            target: "session.token",
            user_id = %user.id,
            error = %e,
            "Failed to cache user snapshot"
        );
    }

    mapping.and(snapshot)
}
