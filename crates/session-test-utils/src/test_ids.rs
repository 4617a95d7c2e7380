//! Fixed test IDs for deterministic tests

use uuid::Uuid;

// User IDs (100-199)
pub const TEST_USER_ALICE: Uuid = Uuid::from_u128(100);
pub const TEST_USER_BOB: Uuid = Uuid::from_u128(101);
pub const TEST_USER_GHOST: Uuid = Uuid::from_u128(199);

pub const TEST_EMAIL_ALICE: &str = "a@b.com";
pub const TEST_EMAIL_BOB: &str = "bob@example.com";

pub const TEST_PASSWORD: &str = "correct horse battery staple";

// Signing secret (test-only)
pub const TEST_JWT_SECRET: &str = "test-secret-do-not-use-in-production";

// Token lifetimes (seconds)
pub const TEST_ACCESS_TTL_SECONDS: u64 = 900;
pub const TEST_REFRESH_TTL_SECONDS: u64 = 3600;
pub const TEST_USER_TTL_SECONDS: u64 = 600;
pub const TEST_TASK_TIMEOUT_SECONDS: u64 = 60;

// Lowest bcrypt cost the service accepts
pub const TEST_BCRYPT_COST: u32 = 10;
