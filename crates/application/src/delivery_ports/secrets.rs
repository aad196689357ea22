use courier_core::AppResult;

/// Port for at-rest encryption of webhook signing secrets.
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts a signing secret for database storage.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>>;

    /// Decrypts a stored signing secret.
    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>>;
}

/// Port for keyed payload signatures.
pub trait PayloadSigner: Send + Sync {
    /// Signs a message with a secret and returns the header value.
    fn sign(&self, message: &[u8], secret: &[u8]) -> AppResult<String>;
}
