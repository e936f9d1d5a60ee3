//! # Leadbook Shared Library
//!
//! Types, persistence and business logic shared by the Leadbook API server
//! and the email delivery worker.
//!
//! ## Module Organization
//!
//! - `auth`: Passwords, opaque tokens, sessions, password reset, admin checks
//! - `booking`: Booking validation and PDF rendering
//! - `crypto`: AES-256-GCM sealing of stored secrets
//! - `db`: Connection pool and migrations
//! - `email`: Template rendering, newsletter chunking, mail transports
//! - `geocode`: Cached address geocoding
//! - `map`: Map points and bounds
//! - `models`: Database models
//! - `redis`: Redis client and rate limiting

pub mod auth;
pub mod booking;
pub mod crypto;
pub mod db;
pub mod email;
pub mod geocode;
pub mod map;
pub mod models;
pub mod redis;

/// Current version of the Leadbook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
