//! AES-256-GCM encryptor for webhook signing secrets at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use courier_application::SecretEncryptor;
use courier_core::{AppError, AppResult};

const NONCE_LEN: usize = 12;

/// AES-256-GCM encryptor for webhook secrets stored in the database.
///
/// Stored values are the 12-byte nonce followed by the ciphertext.
#[derive(Clone)]
pub struct AesSecretEncryptor {
    cipher: Aes256Gcm,
}

impl AesSecretEncryptor {
    /// Creates a new encryptor from a 32-byte key.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key_bytes.into());
        Self { cipher }
    }

    /// Creates a new encryptor from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim()).map_err(|error| {
            AppError::Validation(format!(
                "invalid WEBHOOK_SECRET_ENCRYPTION_KEY hex: {error}"
            ))
        })?;

        let key: [u8; 32] = decoded.try_into().map_err(|_| {
            AppError::Validation(
                "WEBHOOK_SECRET_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars)"
                    .to_owned(),
            )
        })?;

        Ok(Self::new(&key))
    }
}

impl SecretEncryptor for AesSecretEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|error| {
            AppError::Internal(format!("failed to encrypt webhook secret: {error}"))
        })?;

        let mut stored = Vec::with_capacity(nonce.len() + ciphertext.len());
        stored.extend_from_slice(&nonce);
        stored.extend_from_slice(&ciphertext);
        Ok(stored)
    }

    fn decrypt(&self, stored: &[u8]) -> AppResult<Vec<u8>> {
        if stored.len() < NONCE_LEN {
            return Err(AppError::Internal(
                "stored webhook secret is shorter than its nonce".to_owned(),
            ));
        }

        let (nonce_bytes, ciphertext) = stored.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] = nonce_bytes.try_into().map_err(|_| {
            AppError::Internal("webhook secret nonce must be exactly 12 bytes".to_owned())
        })?;

        self.cipher
            .decrypt(&Nonce::from(nonce_array), ciphertext)
            .map_err(|error| {
                AppError::Internal(format!("failed to decrypt webhook secret: {error}"))
            })
    }
}
