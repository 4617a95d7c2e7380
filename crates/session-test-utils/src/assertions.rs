//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for issued tokens.

use session_service::crypto::{verify_access_token, AccessClaims, ACCESS_TOKEN_AUDIENCE};
use session_service::models::User;

/// Assertions on an access token string.
///
/// # Example
/// ```rust,ignore
/// pair.access_token
///     .assert_access_token_for(&user, TEST_JWT_SECRET)
///     .assert_lifetime(900);
/// ```
pub trait AccessTokenAssertions {
    /// Verify the token and return its claims, failing the test otherwise.
    fn claims(&self, secret: &str) -> AccessClaims;

    /// Assert the token verifies and names `user` (subject, email, role).
    fn assert_access_token_for(&self, user: &User, secret: &str) -> &Self;

    /// Assert `exp - iat` equals `seconds`.
    fn assert_lifetime(&self, secret: &str, seconds: i64) -> &Self;
}

impl AccessTokenAssertions for String {
    fn claims(&self, secret: &str) -> AccessClaims {
        match verify_access_token(self, secret.as_bytes()) {
            Ok(claims) => claims,
            Err(e) => panic!("access token failed verification: {e}"),
        }
    }

    fn assert_access_token_for(&self, user: &User, secret: &str) -> &Self {
        let claims = self.claims(secret);
        assert_eq!(claims.sub, user.id.to_string(), "subject mismatch");
        assert_eq!(claims.email, user.email, "email mismatch");
        assert_eq!(claims.role, user.role, "role mismatch");
        assert_eq!(claims.aud, ACCESS_TOKEN_AUDIENCE, "audience mismatch");
        self
    }

    fn assert_lifetime(&self, secret: &str, seconds: i64) -> &Self {
        let claims = self.claims(secret);
        assert_eq!(
            claims.exp - claims.iat,
            seconds,
            "expected a {seconds}s lifetime"
        );
        self
    }
}

/// Assert that a refresh token is opaque: 43 base64url characters and not a
/// JWT.
pub fn assert_opaque_refresh_token(token: &str) {
    assert_eq!(token.len(), 43, "refresh token should be 43 characters");
    assert!(
        token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        "refresh token should be base64url without padding"
    );
    assert!(!token.contains('.'), "refresh token must not be a JWT");
}
