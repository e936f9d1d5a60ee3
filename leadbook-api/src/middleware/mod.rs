/// Middleware modules for the API server
///
/// - `auth`: session authentication, license gate, admin gate
/// - `rate_limit`: Redis token bucket limits
/// - `security`: security response headers

pub mod auth;
pub mod rate_limit;
pub mod security;
