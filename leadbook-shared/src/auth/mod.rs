/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id hashing with legacy SHA-256 upgrade
/// - [`token`]: Opaque prefixed tokens and their HMAC digests
/// - [`session`]: Session issue, verify, refresh and revoke
/// - [`reset`]: Password reset request and confirmation
/// - [`authorization`]: Admin detection and the request auth context
///
/// # Security Features
///
/// - **Password Hashing**: Argon2id with 64 MB memory, 3 iterations
/// - **Tokens**: 48 random base62 characters, stored as HMAC-SHA256 digests
/// - **Constant-time Comparison**: Legacy digests and token checks
///
/// # Example
///
/// ```no_run
/// use leadbook_shared::auth::password::{hash_password, verify_password};
/// use leadbook_shared::auth::token::{generate_token, hash_token, TokenKind};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Sup3r$ecret")?;
/// assert!(verify_password("Sup3r$ecret", &hash)?);
///
/// let token = generate_token(TokenKind::Session);
/// let digest = hash_token(&token, "server-secret");
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod password;
pub mod reset;
pub mod session;
pub mod token;
