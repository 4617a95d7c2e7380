//! Metrics definitions for the session service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `session_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `flow`: sign_up, sign_in, refresh
//! - `status`: bounded by each recorder's callers
//! - `family`: refresh, user
//! - `outcome`: hit, miss, error
//! - `task`: bounded by code (populate_session, revoke_refresh_token)
//! - `endpoint`: the fixed route table, everything else is `/other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("session_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Issuance is CPU-bound (HMAC + CSPRNG); cache writes are detached.
        .set_buckets_for_metric(
            Matcher::Prefix("session_token_issuance".to_string()),
            &[0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("session_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `session_http_requests_total`, `session_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("session_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("session_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto the fixed route table.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/auth/sign-up" => "/api/v1/auth/sign-up",
        "/api/v1/auth/sign-in" => "/api/v1/auth/sign-in",
        "/api/v1/auth/refresh" => "/api/v1/auth/refresh",
        "/api/v1/auth/me" => "/api/v1/auth/me",
        "/api/v1/users" => "/api/v1/users",
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replace the user id segment with a placeholder.
fn normalize_dynamic_endpoint(path: &str) -> &'static str {
    let single_segment = |rest: &str| !rest.is_empty() && !rest.contains('/');

    if let Some(rest) = path.strip_prefix("/api/v1/users/") {
        if single_segment(rest) {
            return "/api/v1/users/{id}";
        }
    }
    if let Some(rest) = path.strip_prefix("/api/v1/private/users/") {
        if single_segment(rest) {
            return "/api/v1/private/users/{id}";
        }
    }

    "/other"
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `session_token_issuance_duration_seconds`, `session_token_issuance_total`
/// Labels: `flow`, `status`
pub fn record_token_issuance(flow: &str, status: &str, duration: Duration) {
    histogram!("session_token_issuance_duration_seconds",
        "flow" => flow.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("session_token_issuance_total",
        "flow" => flow.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record the outcome of a refresh token rotation
///
/// Metric: `session_token_rotation_total`
/// Labels: `status` (success, not_found, user_not_found, error)
pub fn record_token_rotation(status: &str) {
    counter!("session_token_rotation_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Cache Metrics
// ============================================================================

/// Record a session cache lookup
///
/// Metric: `session_cache_lookups_total`
/// Labels: `family`, `outcome`
pub fn record_cache_lookup(family: &str, outcome: &str) {
    counter!("session_cache_lookups_total",
        "family" => family.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a read from the durable user store after a user snapshot miss
///
/// Metric: `session_user_store_fallbacks_total`
/// Labels: `status` (found, not_found, error)
pub fn record_user_store_fallback(status: &str) {
    counter!("session_user_store_fallbacks_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Background Task Metrics
// ============================================================================

/// Record the outcome of a detached background task
///
/// Metric: `session_background_tasks_total`
/// Labels: `task`, `status` (success, error, timeout)
///
/// ALERT: a sustained `timeout` rate means the cache is stalling.
pub fn record_background_task(task: &str, status: &str) {
    counter!("session_background_tasks_total",
        "task" => task.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `session_db_query_duration_seconds`, `session_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("session_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("session_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
