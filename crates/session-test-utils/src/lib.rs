//! # Session Test Utilities
//!
//! Shared test utilities for the session service.
//!
//! This crate provides:
//! - In-memory session cache with TTL expiry and failure injection
//! - In-memory durable user store
//! - A harness wiring the issuer and rotator over those doubles
//! - Fixed test IDs and users
//! - Token assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestSessionHarness::new(RotationMode::Detached);
//!     let user = harness.seed_user(test_user());
//!
//!     let pair = harness.issuer.issue(&user)?;
//!     harness.settle().await;
//!
//!     pair.access_token.assert_access_token_for(&user, TEST_JWT_SECRET);
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_cache;
pub mod mock_users;
pub mod test_ids;

pub use assertions::*;
pub use fixtures::*;
pub use mock_cache::*;
pub use mock_users::*;
pub use test_ids::*;

pub use session_service::services::RotationMode;
