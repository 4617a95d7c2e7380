//! HTTP routes.
//!
//! Defines the Axum router and application state.

use crate::cache::SessionStore;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_access_token, AuthState};
use crate::repositories::UserRepository;
use crate::services::{RefreshRotator, TokenIssuer};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub rotator: Arc<RefreshRotator>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: SessionStore,
    pub config: Config,
}

/// Build the application routes.
///
/// - `/health` - Liveness probe, public
/// - `/metrics` - Prometheus scrape endpoint, public
/// - `/api/v1/auth/sign-up`, `/sign-in`, `/refresh` - public
/// - `/api/v1/auth/me` - requires a bearer access token
/// - `/api/v1/users`, `/api/v1/users/:id` - requires a bearer access token;
///   updates and deletes are self-only
/// - `/api/v1/private/users/:id` - requires an admin bearer access token
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        secret: state.config.jwt_secret.clone(),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/auth/sign-up", post(handlers::sign_up))
        .route("/api/v1/auth/sign-in", post(handlers::sign_in))
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/users", get(handlers::list_users))
        .route(
            "/api/v1/users/:id",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/api/v1/private/users/:id",
            patch(handlers::private_update_user),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            require_access_token,
        ))
        .with_state(state);

    // Layers run bottom-to-top: metrics outermost, then trace, then timeout.
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
