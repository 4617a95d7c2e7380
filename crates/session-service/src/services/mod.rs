//! Service layer.
//!
//! - `token_service` - Token issuer
//! - `rotation_service` - Refresh token rotation
//! - `auth_service` - Sign-up and sign-in flows
//! - `user_service` - User listing, lookup and updates

pub mod auth_service;
pub mod rotation_service;
pub mod token_service;
pub mod user_service;

pub use rotation_service::{RefreshRotator, RotationMode};
pub use token_service::TokenIssuer;
