//! Repository layer.
//!
//! Database access following the Handler -> Service -> Repository
//! architecture.

pub mod users;

pub use users::{PgUserRepository, UserRepository};
