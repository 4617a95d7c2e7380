//! Bearer token middleware.
//!
//! Extracts the access token from the `Authorization` header, verifies it
//! with the shared secret, and stores the [`AccessClaims`] in request
//! extensions for downstream handlers.

use crate::crypto::{verify_access_token, AccessClaims};
use crate::errors::SessionError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct AuthState {
    pub secret: SecretString,
}

fn extract_bearer_token(req: &Request) -> Result<&str, SessionError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "session.middleware.auth", "Missing Authorization header");
            SessionError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "session.middleware.auth", "Invalid Authorization header format");
        SessionError::InvalidToken("Invalid Authorization header format".to_string())
    })
}

/// Require a valid access token.
///
/// - Returns 401 if the token is missing, malformed, expired, or signed with
///   another secret
/// - Continues with `AccessClaims` in extensions otherwise
#[instrument(skip_all, name = "session.middleware.auth")]
pub async fn require_access_token(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, SessionError> {
    let token = extract_bearer_token(&req)?;
    let claims: AccessClaims = verify_access_token(token, state.secret.expose_secret().as_bytes())?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
