//! Session service library.
//!
//! Issues short-lived signed access tokens and opaque refresh tokens, and
//! rotates refresh tokens through a cache-aside read path.
//!
//! # Modules
//!
//! - `cache` - Session cache contract, typed key families, Redis adapter
//! - `config` - Service configuration
//! - `crypto` - Access token signing, refresh token generation, passwords
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer auth and HTTP metrics
//! - `models` - Data models
//! - `observability` - Log correlation and metrics
//! - `repositories` - Durable user store
//! - `routes` - Router and application state
//! - `services` - Token issuer, refresh rotation, sign-up/sign-in
//! - `tasks` - Detached background task executor

pub mod cache;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
