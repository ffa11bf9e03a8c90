use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;

const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing for worker photos at rest.
///
/// Sealed blobs are `nonce (12 bytes) || ciphertext`.
pub struct ImageSealer {
    cipher: Aes256Gcm,
}

impl ImageSealer {
    /// Create from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self, SealError> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(key_base64.trim())
            .map_err(|_| SealError::InvalidKey)?;
        Self::from_key(&key_bytes)
    }

    pub fn from_key(key: &[u8]) -> Result<Self, SealError> {
        if key.len() != 32 {
            return Err(SealError::InvalidKey);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, image_bytes: &[u8]) -> Result<Vec<u8>, SealError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, image_bytes)
            .map_err(|_| SealError::SealFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < NONCE_LEN {
            return Err(SealError::OpenFailed);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SealError::OpenFailed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("Invalid encryption key (must be 32 bytes, base64-encoded)")]
    InvalidKey,

    #[error("Sealing photo bytes failed")]
    SealFailed,

    #[error("Opening sealed photo failed (wrong key or corrupted blob)")]
    OpenFailed,
}
