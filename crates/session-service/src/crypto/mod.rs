use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::SessionError;
use crate::models::Role;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Audience stamped into every access token.
pub const ACCESS_TOKEN_AUDIENCE: &str = "users";

/// Access tokens are signed with a shared symmetric secret.
pub const ACCESS_TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Entropy of a refresh token in bytes (256 bits).
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Tokens larger than this are rejected before any parsing (4KB).
const MAX_JWT_SIZE_BYTES: usize = 4096;

/// Bcrypt hash verified when an email is unknown, so that sign-in takes the
/// same time whether or not the account exists.
const DUMMY_PASSWORD_HASH: &str = "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Access token claims.
///
/// `email` and `role` are denormalized so downstream checks need no lookup.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Fixed service audience
    pub aud: String,
    pub email: String,
    pub role: Role,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Unique token identifier
    pub jti: String,
}

/// Custom Debug implementation that redacts identifying fields.
impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("sub", &"[REDACTED]")
            .field("aud", &self.aud)
            .field("email", &"[REDACTED]")
            .field("role", &self.role)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("jti", &"[REDACTED]")
            .finish()
    }
}

/// Sign access token claims with the shared HS256 secret.
///
/// A blank secret is a misconfiguration and is reported rather than
/// producing a token anyone could forge.
#[instrument(skip_all)]
pub fn sign_access_token(claims: &AccessClaims, secret: &[u8]) -> Result<String, SessionError> {
    if secret.is_empty() {
        return Err(SessionError::Signing(
            "signing secret is not configured".to_string(),
        ));
    }

    let mut header = Header::new(ACCESS_TOKEN_ALGORITHM);
    header.typ = Some("JWT".to_string());

    encode(&header, claims, &EncodingKey::from_secret(secret))
        .map_err(|e| SessionError::Signing(format!("JWT signing operation failed: {}", e)))
}

/// Verify an access token and extract its claims.
///
/// Validates:
/// - Token size (must be <= 4KB)
/// - HS256 signature
/// - Expiration (`exp` claim)
/// - Audience (`aud` must be [`ACCESS_TOKEN_AUDIENCE`])
#[instrument(skip_all)]
pub fn verify_access_token(token: &str, secret: &[u8]) -> Result<AccessClaims, SessionError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "session.crypto",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(SessionError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()));
    }

    let mut validation = Validation::new(ACCESS_TOKEN_ALGORITHM);
    validation.validate_exp = true;
    validation.set_audience(&[ACCESS_TOKEN_AUDIENCE]);

    let token_data = decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(target: "session.crypto", error = %e, "Token verification failed");
            SessionError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
        })?;

    Ok(token_data.claims)
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, SessionError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| SessionError::Crypto(format!("Random bytes generation failed: {}", e)))?;
    Ok(bytes)
}

/// Generate an opaque refresh token.
///
/// 32 CSPRNG bytes, base64url without padding (43 characters). Carries no
/// claims and is unrelated to any access token.
pub fn generate_refresh_token() -> Result<String, SessionError> {
    let bytes = generate_random_bytes(REFRESH_TOKEN_BYTES)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a password with bcrypt.
///
/// Cost is re-checked here even though config validates it, so a direct
/// caller cannot produce a weak hash.
#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, SessionError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(SessionError::Crypto(format!(
            "Invalid bcrypt cost: {} (must be {}-{})",
            cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
        )));
    }

    bcrypt::hash(password, cost)
        .map_err(|e| SessionError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a bcrypt hash.
///
/// With `None` the dummy hash is checked instead and the result is always
/// `false`.
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: Option<&str>) -> Result<bool, SessionError> {
    let is_valid = bcrypt::verify(password, hash.unwrap_or(DUMMY_PASSWORD_HASH))
        .map_err(|e| SessionError::Crypto(format!("Password verification failed: {}", e)))?;
    Ok(hash.is_some() && is_valid)
}
