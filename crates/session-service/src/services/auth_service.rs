//! Sign-up and sign-in flows.
//!
//! Both end in [`TokenIssuer::issue`]. Sign-up persists the user before
//! issuing, so no token ever names a user the store does not have.

use crate::crypto;
use crate::errors::SessionError;
use crate::models::{Role, SignInRequest, SignUpRequest, TokenPair, User};
use crate::observability::metrics::record_token_issuance;
use crate::repositories::UserRepository;
use crate::services::token_service::TokenIssuer;
use chrono::Utc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// Register a new user and issue their first token pair.
#[instrument(skip_all)]
pub async fn register(
    issuer: &TokenIssuer,
    users: &dyn UserRepository,
    request: SignUpRequest,
    bcrypt_cost: u32,
) -> Result<(User, TokenPair), SessionError> {
    let name = required_field("name", &request.name)?;
    let surname = required_field("surname", &request.surname)?;
    let email = validate_email(&request.email)?;
    if request.password.trim().is_empty() {
        return Err(SessionError::Validation("password must not be empty".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        name,
        surname,
        email,
        password_hash: crypto::hash_password(&request.password, bcrypt_cost)?,
        role: Role::User,
        created_at: Utc::now(),
        updated_at: None,
    };

    users.create_user(&user).await?;
    let pair = issue_for("sign_up", issuer, &user)?;

    info!(target: "session.auth", user_id = %user.id, "User registered");
    Ok((user, pair))
}

/// Check credentials and issue a token pair.
///
/// Unknown email and wrong password are indistinguishable to the caller.
#[instrument(skip_all)]
pub async fn authenticate(
    issuer: &TokenIssuer,
    users: &dyn UserRepository,
    request: SignInRequest,
) -> Result<(User, TokenPair), SessionError> {
    let email = validate_email(&request.email)?;
    if request.password.trim().is_empty() {
        return Err(SessionError::Validation("password must not be empty".to_string()));
    }

    let user = users.get_user_by_email(&email).await?;
    let hash = user.as_ref().map(|u| u.password_hash.as_str());
    if !crypto::verify_password(&request.password, hash)? {
        info!(target: "session.auth", "Sign-in rejected");
        return Err(SessionError::InvalidCredentials);
    }
    let user = user.ok_or(SessionError::InvalidCredentials)?;

    let pair = issue_for("sign_in", issuer, &user)?;

    info!(target: "session.auth", user_id = %user.id, "User signed in");
    Ok((user, pair))
}

fn issue_for(flow: &str, issuer: &TokenIssuer, user: &User) -> Result<TokenPair, SessionError> {
    let start = Instant::now();
    let result = issuer.issue(user);
    let status = if result.is_ok() { "success" } else { "error" };
    record_token_issuance(flow, status, start.elapsed());
    result
}

pub(crate) fn required_field(field: &str, value: &str) -> Result<String, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_email(value: &str) -> Result<String, SessionError> {
    let email = required_field("email", value)?;
    if !email.contains('@') {
        return Err(SessionError::Validation("email format is invalid".to_string()));
    }
    Ok(email)
}
