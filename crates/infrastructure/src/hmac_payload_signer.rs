//! HMAC-SHA256 webhook payload signatures.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use courier_application::PayloadSigner;
use courier_core::{AppError, AppResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs canonical payload bytes with HMAC-SHA256 and base64-encodes the tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacPayloadSigner;

impl HmacPayloadSigner {
    /// Creates a payload signer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PayloadSigner for HmacPayloadSigner {
    fn sign(&self, message: &[u8], secret: &[u8]) -> AppResult<String> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).map_err(|error| {
            AppError::Internal(format!("failed to initialise webhook signer: {error}"))
        })?;
        mac.update(message);

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}
