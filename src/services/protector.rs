use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 24;
const EXPIRY_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtectError {
    #[error("protected payload is not valid base64 or is truncated")]
    Malformed,
    #[error("protected payload failed authentication")]
    Tampered,
    #[error("protected payload expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("encryption failed")]
    Encryption,
}

/// Time-limited authenticated encryption of short strings.
///
/// Output layout before base64: `nonce(24) || seal(expiry_be(8) || plaintext)`.
/// The key is derived from the secret and a purpose string, so a payload
/// protected for one purpose does not open under another.
pub struct TokenProtector {
    cipher: XChaCha20Poly1305,
    lifetime: Duration,
}

impl TokenProtector {
    pub fn new(secret: &str, purpose: &str, lifetime: Duration) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(purpose.as_bytes());
        hasher.update([0u8]);
        hasher.update(secret.as_bytes());
        let key = hasher.finalize();

        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
            lifetime,
        }
    }

    pub fn protect(&self, plaintext: &str) -> Result<String, ProtectError> {
        self.protect_until(plaintext, Utc::now() + self.lifetime)
    }

    pub fn protect_until(
        &self,
        plaintext: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ProtectError> {
        let mut payload = Vec::with_capacity(EXPIRY_LEN + plaintext.len());
        payload.extend_from_slice(&expires_at.timestamp().to_be_bytes());
        payload.extend_from_slice(plaintext.as_bytes());

        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, payload.as_slice())
            .map_err(|_| ProtectError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn unprotect(&self, protected: &str) -> Result<String, ProtectError> {
        self.unprotect_at(protected, Utc::now())
    }

    pub fn unprotect_at(&self, protected: &str, now: DateTime<Utc>) -> Result<String, ProtectError> {
        let raw = URL_SAFE_NO_PAD
            .decode(protected.trim())
            .map_err(|_| ProtectError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(ProtectError::Malformed);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let opened = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| ProtectError::Tampered)?;
        if opened.len() < EXPIRY_LEN {
            return Err(ProtectError::Malformed);
        }

        let (expiry, plaintext) = opened.split_at(EXPIRY_LEN);
        let mut expiry_bytes = [0u8; EXPIRY_LEN];
        expiry_bytes.copy_from_slice(expiry);
        let expires_at = Utc
            .timestamp_opt(i64::from_be_bytes(expiry_bytes), 0)
            .single()
            .ok_or(ProtectError::Malformed)?;

        if expires_at <= now {
            return Err(ProtectError::Expired(expires_at));
        }

        String::from_utf8(plaintext.to_vec()).map_err(|_| ProtectError::Malformed)
    }
}
