use crate::crypto::AccessClaims;
use crate::errors::SessionError;
use crate::models::{
    AuthResponse, MeResponse, RefreshRequest, SignInRequest, SignUpRequest, TokenPair,
    TokenPairResponse, User, UserResponse,
};
use crate::routes::AppState;
use crate::services::auth_service;
use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

fn auth_response(state: &AppState, user: &User, pair: TokenPair) -> AuthResponse {
    AuthResponse {
        user: UserResponse::from(user),
        jwt: TokenPairResponse::bearer(pair, state.issuer.access_ttl().as_secs()),
    }
}

/// Handle sign-up
///
/// POST /api/v1/auth/sign-up
#[instrument(skip_all, name = "session.handlers.sign_up")]
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), SessionError> {
    let (user, pair) = auth_service::register(
        &state.issuer,
        state.users.as_ref(),
        payload,
        state.config.bcrypt_cost,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(auth_response(&state, &user, pair))))
}

/// Handle sign-in
///
/// POST /api/v1/auth/sign-in
#[instrument(skip_all, name = "session.handlers.sign_in")]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<AuthResponse>, SessionError> {
    let (user, pair) =
        auth_service::authenticate(&state.issuer, state.users.as_ref(), payload).await?;

    Ok(Json(auth_response(&state, &user, pair)))
}

/// Handle refresh token rotation
///
/// POST /api/v1/auth/refresh
///
/// An unknown or retired token is a 401 `SESSION_EXPIRED`; the client must
/// sign in again.
#[instrument(skip_all, name = "session.handlers.refresh")]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, SessionError> {
    let pair = state.rotator.rotate(&payload.refresh_token).await?;

    Ok(Json(TokenPairResponse::bearer(
        pair,
        state.issuer.access_ttl().as_secs(),
    )))
}

/// Handler for GET /api/v1/auth/me
///
/// Returns the identity carried by the verified access token. Requires the
/// bearer auth middleware.
#[instrument(skip_all, name = "session.handlers.me")]
pub async fn me(Extension(claims): Extension<AccessClaims>) -> Json<MeResponse> {
    tracing::debug!(target: "session.handlers.me", "Returning token identity");

    Json(MeResponse {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        expires_at: claims.exp,
    })
}
