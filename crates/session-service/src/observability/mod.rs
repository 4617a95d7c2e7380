//! Observability helpers.
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit field
//! allow-listing. Fields fall into three groups:
//! - **SAFE**: logged as-is (enums, outcomes, user ids)
//! - **HASHED**: SHA-256 prefix for correlation (refresh tokens)
//! - **NEVER**: must not appear in logs (secrets, access tokens, passwords,
//!   emails, connection URLs)

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a value for correlation in logs (SHA-256, first 8 hex chars).
///
/// One-way and truncated. Not a substitute for secrecy: it only lets log
/// lines about the same refresh token be matched up.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    hex::encode(result.get(..4).unwrap_or_default())
}
