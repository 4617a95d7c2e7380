use crate::crypto::AccessClaims;
use crate::errors::SessionError;
use crate::models::{ListUsersQuery, PrivateUserUpdateRequest, UserResponse, UserUpdateRequest};
use crate::routes::AppState;
use crate::services::user_service;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for GET /api/v1/users
///
/// Query parameters: `limit`, `offset`, `sort` (`asc`/`desc`), `order`
/// (`name`, `surname`, `email`, `createdDate`) and `role`.
#[instrument(skip_all, name = "session.handlers.list_users")]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, SessionError> {
    let users = user_service::list_users(state.users.as_ref(), &query).await?;

    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// Handler for GET /api/v1/users/:id
#[instrument(skip_all, name = "session.handlers.get_user")]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, SessionError> {
    let user = user_service::get_user(state.users.as_ref(), id).await?;

    Ok(Json(UserResponse::from(&user)))
}

/// Handle self-update
///
/// PATCH /api/v1/users/:id
#[instrument(skip_all, name = "session.handlers.update_user")]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> Result<Json<UserResponse>, SessionError> {
    let user = user_service::update_self(
        state.users.as_ref(),
        &state.sessions,
        &claims,
        id,
        payload,
        state.config.bcrypt_cost,
    )
    .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// Handle self-deletion
///
/// DELETE /api/v1/users/:id
#[instrument(skip_all, name = "session.handlers.delete_user")]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, SessionError> {
    user_service::delete_self(state.users.as_ref(), &state.sessions, &claims, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle an administrative update
///
/// PATCH /api/v1/private/users/:id
///
/// Callers need the `admin` or `super-admin` role.
#[instrument(skip_all, name = "session.handlers.private_update_user")]
pub async fn private_update_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PrivateUserUpdateRequest>,
) -> Result<Json<UserResponse>, SessionError> {
    let user =
        user_service::update_as_admin(state.users.as_ref(), &state.sessions, &claims, id, payload)
            .await?;

    Ok(Json(UserResponse::from(&user)))
}
