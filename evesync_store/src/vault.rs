use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
};
use rand::RngCore;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("ciphertext was not produced by the configured key or is corrupted")]
    InvalidCiphertext,

    #[error("encryption key must be base64 encoding of {KEY_LEN} bytes")]
    InvalidKey,

    #[error("plaintext could not be sealed")]
    Seal,
}

/// Where the process-wide key came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    Explicit,
    DerivedFromSecret,
    Ephemeral,
}

/// 256-bit symmetric key for token secrets at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Picks the key once at startup: explicit key, then a key derived from
    /// the generic secret, then a random key that dies with the process.
    pub fn resolve(
        explicit_key: Option<&str>,
        fallback_secret: Option<&str>,
    ) -> Result<(Self, KeySource), VaultError> {
        if let Some(encoded) = explicit_key.filter(|value| !value.trim().is_empty()) {
            return Ok((Self::from_encoded(encoded)?, KeySource::Explicit));
        }

        if let Some(secret) = fallback_secret.filter(|value| !value.is_empty()) {
            return Ok((Self::derive_from_secret(secret), KeySource::DerivedFromSecret));
        }

        log::warn!(
            "no token encryption key configured; using an ephemeral key, stored tokens will be unreadable after restart"
        );
        Ok((Self::generate(), KeySource::Ephemeral))
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, VaultError> {
        let encoded = encoded.trim();
        let bytes = URL_SAFE
            .decode(encoded)
            .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
            .or_else(|_| STANDARD.decode(encoded))
            .map_err(|_| VaultError::InvalidKey)?;

        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Secret bytes right-padded with `'0'`, cut at the key length.
    pub fn derive_from_secret(secret: &str) -> Self {
        let mut key = [b'0'; KEY_LEN];
        let bytes = secret.as_bytes();
        let len = bytes.len().min(KEY_LEN);
        key[..len].copy_from_slice(&bytes[..len]);
        Self(key)
    }

    pub fn generate() -> Self {
        let mut key = [0_u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn to_encoded(&self) -> String {
        URL_SAFE.encode(self.0)
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// AES-256-GCM sealing of token secrets.
///
/// Ciphertext text is `base64url(nonce || sealed)`; every call draws a fresh
/// nonce, so sealing the same plaintext twice gives different output.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key: &VaultKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.0);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Seal)?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(framed))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let framed = URL_SAFE
            .decode(ciphertext.trim())
            .map_err(|_| VaultError::InvalidCiphertext)?;
        if framed.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::InvalidCiphertext);
        }

        let (nonce, sealed) = framed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| VaultError::InvalidCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidCiphertext)
    }

    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<String>, VaultError> {
        plaintext.map(|value| self.encrypt(value)).transpose()
    }

    pub fn decrypt_optional(&self, ciphertext: Option<&str>) -> Result<Option<String>, VaultError> {
        ciphertext.map(|value| self.decrypt(value)).transpose()
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVault")
    }
}
