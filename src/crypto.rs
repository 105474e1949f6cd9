//! Token encryption module using AES-256-GCM
//!
//! Access and refresh tokens are stored encrypted, with additional
//! authenticated data binding each ciphertext to its (account, provider)
//! pair so a ciphertext copied between rows fails to decrypt.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::connection::Model as ConnectionModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for the encryption key with zeroization on drop
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn connection_aad(connection: &ConnectionModel) -> String {
    format!("{}|{}", connection.account_id, connection.provider)
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Version byte + nonce prefix the ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    // Legacy plaintext payloads carry no version marker
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Ok(ciphertext.to_vec());
    }

    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let body = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(nonce, Payload { msg: body, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Type alias for encrypted token pair result
type EncryptedTokens = Result<(Option<Vec<u8>>, Option<Vec<u8>>), CryptoError>;

/// Encrypt tokens for a connection model
pub fn encrypt_connection_tokens(
    key: &CryptoKey,
    connection: &ConnectionModel,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let aad = connection_aad(connection);

    let encrypted_access_token = access_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    let encrypted_refresh_token = refresh_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    Ok((encrypted_access_token, encrypted_refresh_token))
}

/// Type alias for decrypted token pair result
type DecryptedTokens = Result<(Option<String>, Option<String>), CryptoError>;

/// Decrypt tokens for a connection model
pub fn decrypt_connection_tokens(key: &CryptoKey, connection: &ConnectionModel) -> DecryptedTokens {
    let aad = connection_aad(connection);

    let decode = |ciphertext: Option<&Vec<u8>>| -> Result<Option<String>, CryptoError> {
        match ciphertext {
            Some(token) => decrypt_bytes(key, aad.as_bytes(), token)
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| {
                        CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e))
                    })
                })
                .map(Some),
            None => Ok(None),
        }
    };

    let decrypted_access_token = decode(connection.access_token_ciphertext.as_ref())?;
    let decrypted_refresh_token = decode(connection.refresh_token_ciphertext.as_ref())?;

    Ok((decrypted_access_token, decrypted_refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    fn sample_connection() -> ConnectionModel {
        ConnectionModel {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            provider: "google_business".to_string(),
            status: "active".to_string(),
            access_token_ciphertext: None,
            refresh_token_ciphertext: None,
            token_type: "Bearer".to_string(),
            scope: None,
            expires_at: None,
            last_error: None,
            revision: 0,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, b"aad", &encrypted).expect("decryption succeeds");
        assert_eq!(decrypted, b"secret");
    }

    #[test]
    fn different_aad_fails() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad-1", b"secret").expect("encryption succeeds");
        assert!(decrypt_bytes(&key, b"aad-2", &encrypted).is_err());
    }

    #[test]
    fn modified_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        encrypted[13] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn nonce_uniqueness() {
        let key = test_key();
        let encrypted1 = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
    }

    #[test]
    fn legacy_plaintext_passthrough() {
        let key = test_key();
        let legacy = b"legacy-token".to_vec();
        let result = decrypt_bytes(&key, b"aad", &legacy).expect("legacy plaintext is returned");
        assert_eq!(result, legacy);
        assert!(!is_encrypted_payload(&legacy));
    }

    #[test]
    fn connection_tokens_roundtrip() {
        let key = test_key();
        let mut connection = sample_connection();

        let (access, refresh) =
            encrypt_connection_tokens(&key, &connection, Some("access-123"), Some("refresh-456"))
                .expect("encryption succeeds");
        connection.access_token_ciphertext = access;
        connection.refresh_token_ciphertext = refresh;

        let (access, refresh) =
            decrypt_connection_tokens(&key, &connection).expect("decryption succeeds");
        assert_eq!(access.as_deref(), Some("access-123"));
        assert_eq!(refresh.as_deref(), Some("refresh-456"));
    }

    #[test]
    fn ciphertext_bound_to_account() {
        let key = test_key();
        let mut connection = sample_connection();
        let (access, _) = encrypt_connection_tokens(&key, &connection, Some("access-123"), None)
            .expect("encryption succeeds");
        connection.access_token_ciphertext = access;

        // Same ciphertext under a different account must not decrypt
        connection.account_id = Uuid::new_v4();
        assert!(decrypt_connection_tokens(&key, &connection).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let key = test_key();
        let short = vec![VERSION_ENCRYPTED, 0x02];
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &short),
            Err(CryptoError::InvalidFormat)
        ));
    }
}
