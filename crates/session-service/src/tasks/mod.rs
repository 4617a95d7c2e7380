//! Background tasks for the session service.
//!
//! # Tasks
//!
//! - `detached` - Fire-and-forget cache work scheduled by issuance and rotation

pub mod detached;

pub use detached::DetachedTasks;
