/// Handler for GET /health
///
/// Liveness only; does not touch the cache or the database.
pub async fn health_check() -> &'static str {
    "OK"
}
