//! The process-wide credential vault.

use zeroize::Zeroizing;

use crate::{
    cipher::{Aes256GcmCipher, Cipher, EncryptedBlob},
    error::{Result, VaultError},
};

/// Encrypts and decrypts credential blobs with a process-wide 32-byte key.
///
/// Generic over [`Cipher`] but defaults to [`Aes256GcmCipher`]. The key is
/// immutable for the life of the process and zeroized on drop.
pub struct CredentialVault<C: Cipher = Aes256GcmCipher> {
    key: Zeroizing<[u8; 32]>,
    cipher: C,
}

impl CredentialVault<Aes256GcmCipher> {
    /// Vault keyed by the 64-hex-char process secret.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| VaultError::InvalidKey(format!("not hex: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("expected 32 bytes (64 hex chars)".into()))?;
        Ok(Self::with_cipher(key, Aes256GcmCipher))
    }

    /// Vault with a random per-process key. Development only: every blob
    /// encrypted with it becomes unreadable after restart.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut key);
        Self::with_cipher(key, Aes256GcmCipher)
    }
}

impl<C: Cipher> CredentialVault<C> {
    #[must_use]
    pub fn with_cipher(key: [u8; 32], cipher: C) -> Self {
        Self {
            key: Zeroizing::new(key),
            cipher,
        }
    }

    /// Encrypt a plaintext into the `hex(iv):hex(tag):hex(ct)` storage form.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let blob = self.cipher.seal(&self.key, plaintext.as_bytes())?;
        Ok(blob.to_string())
    }

    /// Decrypt a storage-form blob back to the plaintext.
    pub fn decrypt(&self, raw: &str) -> Result<String> {
        let blob = EncryptedBlob::parse(raw)?;
        let plaintext = self.cipher.open(&self.key, &blob)?;
        String::from_utf8(plaintext).map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }

    /// Encrypt a JSON credential object.
    pub fn encrypt_json(&self, credentials: &serde_json::Value) -> Result<String> {
        self.encrypt(&serde_json::to_string(credentials)?)
    }

    /// Decrypt a blob and parse it as a JSON credential object.
    pub fn decrypt_json(&self, raw: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.decrypt(raw)?)?)
    }
}
