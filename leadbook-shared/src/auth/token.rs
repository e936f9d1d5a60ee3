/// Opaque token generation and hashing
///
/// Every credential Leadbook hands out (session tokens, refresh tokens,
/// password reset tokens, lead intake keys) is a random base62 string behind
/// a kind prefix. Only a keyed HMAC-SHA256 digest of the token is stored, so a
/// leaked database dump cannot be replayed without the server secret.
///
/// # Format
///
/// | Kind          | Prefix | Random chars |
/// |---------------|--------|--------------|
/// | Session       | `lbs_` | 48           |
/// | Refresh       | `lbr_` | 48           |
/// | PasswordReset | `lbp_` | 48           |
/// | LeadKey       | `lbk_` | 32           |
///
/// # Example
///
/// ```
/// use leadbook_shared::auth::token::{generate_token, hash_token, validate_token_format, TokenKind};
///
/// let token = generate_token(TokenKind::Session);
/// assert!(token.starts_with("lbs_"));
/// assert!(validate_token_format(&token, TokenKind::Session));
///
/// let digest = hash_token(&token, "server-secret-at-least-32-bytes-long!!");
/// assert_eq!(digest.len(), 64);
/// ```

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Kind of opaque credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bearer session token
    Session,

    /// Refresh token paired with a session
    Refresh,

    /// Single-use password reset token
    PasswordReset,

    /// Per-owner key used by external lead forms
    LeadKey,
}

impl TokenKind {
    /// Prefix identifying the token kind
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::Session => "lbs_",
            TokenKind::Refresh => "lbr_",
            TokenKind::PasswordReset => "lbp_",
            TokenKind::LeadKey => "lbk_",
        }
    }

    /// Number of random characters after the prefix
    pub fn random_len(&self) -> usize {
        match self {
            TokenKind::LeadKey => 32,
            _ => 48,
        }
    }

    /// Total token length
    pub fn total_len(&self) -> usize {
        self.prefix().len() + self.random_len()
    }
}

/// Generates a new random token of the given kind
pub fn generate_token(kind: TokenKind) -> String {
    let mut rng = rand::thread_rng();

    let random: String = (0..kind.random_len())
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    format!("{}{}", kind.prefix(), random)
}

/// HMAC-SHA256 of the token keyed with the server secret, hex encoded
pub fn hash_token(token: &str, secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks prefix, length and alphabet of a presented token
pub fn validate_token_format(token: &str, kind: TokenKind) -> bool {
    if token.len() != kind.total_len() {
        return false;
    }

    match token.strip_prefix(kind.prefix()) {
        Some(random) => random.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

/// Display prefix for a token (kind prefix plus four characters)
pub fn display_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_from_header(value: &str) -> Option<&str> {
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Constant-time string comparison
///
/// Compares every byte so timing does not reveal the first mismatch position.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
