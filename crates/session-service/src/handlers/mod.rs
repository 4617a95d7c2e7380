//! HTTP handlers.
//!
//! - `auth_handler` - Sign-up, sign-in, refresh and `/me`
//! - `health` - Liveness probe
//! - `metrics` - Prometheus scrape endpoint
//! - `user_handler` - User listing, lookup, updates and deletion

pub mod auth_handler;
pub mod health;
pub mod metrics;
pub mod user_handler;

pub use auth_handler::{me, refresh, sign_in, sign_up};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use user_handler::{delete_user, get_user, list_users, private_update_user, update_user};
