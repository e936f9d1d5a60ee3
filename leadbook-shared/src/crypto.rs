/// Secret encryption for settings
///
/// SMTP passwords (and transactional email API keys, which ride in the same
/// field) are stored encrypted with AES-256-GCM. The stored form is
/// `hex(nonce || ciphertext)` with a fresh 96-bit nonce per encryption.
///
/// # Example
///
/// ```
/// use leadbook_shared::crypto::SecretBox;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
/// let secret_box = SecretBox::from_hex_key(key)?;
///
/// let sealed = secret_box.encrypt("smtp-password")?;
/// assert_eq!(secret_box.decrypt(&sealed)?, "smtp-password");
/// # Ok(())
/// # }
/// ```

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};

const NONCE_LEN: usize = 12;

/// Crypto errors
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key is not 64 hex characters
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// Stored value is not valid hex or too short
    #[error("Malformed ciphertext")]
    Malformed,

    /// Encryption failed
    #[error("Encryption failed")]
    EncryptFailed,

    /// Authentication tag mismatch (wrong key or tampered data)
    #[error("Decryption failed")]
    DecryptFailed,
}

/// AES-256-GCM sealing with a fixed key
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    /// Builds from a 32-byte key given as 64 hex characters
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {}", e)))?;

        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypts a UTF-8 secret
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);

        Ok(hex::encode(sealed))
    }

    /// Decrypts a value produced by [`SecretBox::encrypt`]
    pub fn decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        let bytes = hex::decode(sealed).map_err(|_| CryptoError::Malformed)?;

        // nonce plus a 16-byte tag at minimum
        if bytes.len() < NONCE_LEN + 16 {
            return Err(CryptoError::Malformed);
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn test_encrypt_decrypt() {
        let secret_box = SecretBox::from_hex_key(KEY).unwrap();
        let sealed = secret_box.encrypt("hunter2").unwrap();

        assert_ne!(sealed, "hunter2");
        assert_eq!(secret_box.decrypt(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let secret_box = SecretBox::from_hex_key(KEY).unwrap();
        let a = secret_box.encrypt("same").unwrap();
        let b = secret_box.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretBox::from_hex_key(KEY).unwrap().encrypt("hunter2").unwrap();

        let other_key = "ff112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let other = SecretBox::from_hex_key(other_key).unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::DecryptFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret_box = SecretBox::from_hex_key(KEY).unwrap();
        let mut sealed = secret_box.encrypt("hunter2").unwrap();
        let last = sealed.pop().unwrap();
        sealed.push(if last == '0' { '1' } else { '0' });

        assert!(secret_box.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            SecretBox::from_hex_key("abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            SecretBox::from_hex_key("zz"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_malformed_input() {
        let secret_box = SecretBox::from_hex_key(KEY).unwrap();
        assert!(matches!(secret_box.decrypt("not-hex"), Err(CryptoError::Malformed)));
        assert!(matches!(secret_box.decrypt("abcd"), Err(CryptoError::Malformed)));
    }
}
