//! AES-256-GCM implementation of the [`Cipher`] trait.

use {
    aes_gcm::{
        AesGcm,
        aead::{
            Aead, KeyInit,
            generic_array::{GenericArray, typenum::U16},
        },
        aes::Aes256,
    },
    rand::RngCore,
};

use crate::error::{Result, VaultError};

/// IV length in bytes. GCM accepts arbitrary nonce sizes; the storage
/// format fixes 16.
pub const IV_LEN: usize = 16;

/// Length of the GCM authentication tag, in bytes.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// One encrypted credential blob, stored as `hex(iv):hex(tag):hex(ct)`.
///
/// The colon-separated hex form is portable across storage backends and
/// diffable by hand when rotating credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Parse the storage form. Field order is iv, tag, ciphertext.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split(':');
        let (Some(iv), Some(tag), Some(ct), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::Malformed(
                "expected three colon-separated hex fields".into(),
            ));
        };

        let iv = hex::decode(iv).map_err(|e| VaultError::Malformed(format!("iv: {e}")))?;
        let tag = hex::decode(tag).map_err(|e| VaultError::Malformed(format!("tag: {e}")))?;
        let ciphertext =
            hex::decode(ct).map_err(|e| VaultError::Malformed(format!("ciphertext: {e}")))?;

        if iv.len() != IV_LEN {
            return Err(VaultError::Malformed(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::Malformed(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        Ok(Self {
            iv,
            tag,
            ciphertext,
        })
    }
}

impl std::fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hex::encode(&self.iv),
            hex::encode(&self.tag),
            hex::encode(&self.ciphertext)
        )
    }
}

/// Authenticated symmetric cipher used by the vault.
pub trait Cipher: Send + Sync {
    fn seal(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedBlob>;
    fn open(&self, key: &[u8; 32], blob: &EncryptedBlob) -> Result<Vec<u8>>;
}

/// AES-256-GCM AEAD cipher with a fresh random 16-byte IV per call.
pub struct Aes256GcmCipher;

impl Cipher for Aes256GcmCipher {
    fn seal(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedBlob> {
        let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        // The aead API appends the tag to the ciphertext; the storage
        // format keeps the fields separate.
        let mut sealed = cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext)
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedBlob {
            iv: iv.to_vec(),
            tag,
            ciphertext: sealed,
        })
    }

    fn open(&self, key: &[u8; 32], blob: &EncryptedBlob) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));

        let mut sealed = Vec::with_capacity(blob.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&blob.ciphertext);
        sealed.extend_from_slice(&blob.tag);

        cipher
            .decrypt(GenericArray::from_slice(&blob.iv), sealed.as_ref())
            .map_err(|e| VaultError::CryptoFailure(e.to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42u8; 32];

    #[test]
    fn round_trip() {
        let cipher = Aes256GcmCipher;
        let blob = cipher.seal(&KEY, b"bot token").unwrap();
        assert_eq!(cipher.open(&KEY, &blob).unwrap(), b"bot token");
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = Aes256GcmCipher;
        let blob = cipher.seal(&KEY, b"secret").unwrap();
        let other = [0x43u8; 32];
        assert!(cipher.open(&other, &blob).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = Aes256GcmCipher;
        let mut blob = cipher.seal(&KEY, b"secret").unwrap();
        blob.ciphertext[0] ^= 0x01;
        assert!(cipher.open(&KEY, &blob).is_err());
    }

    #[test]
    fn tampered_tag_fails() {
        let cipher = Aes256GcmCipher;
        let mut blob = cipher.seal(&KEY, b"secret").unwrap();
        blob.tag[0] ^= 0x01;
        assert!(cipher.open(&KEY, &blob).is_err());
    }

    #[test]
    fn tampered_iv_fails() {
        let cipher = Aes256GcmCipher;
        let mut blob = cipher.seal(&KEY, b"secret").unwrap();
        blob.iv[0] ^= 0x01;
        assert!(cipher.open(&KEY, &blob).is_err());
    }

    #[test]
    fn fresh_iv_per_seal() {
        let cipher = Aes256GcmCipher;
        let a = cipher.seal(&KEY, b"same input").unwrap();
        let b = cipher.seal(&KEY, b"same input").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn storage_form_round_trips() {
        let cipher = Aes256GcmCipher;
        let blob = cipher.seal(&KEY, b"payload").unwrap();
        let parsed = EncryptedBlob::parse(&blob.to_string()).unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn malformed_storage_forms_rejected() {
        assert!(EncryptedBlob::parse("").is_err());
        assert!(EncryptedBlob::parse("aa:bb").is_err());
        assert!(EncryptedBlob::parse("aa:bb:cc:dd").is_err());
        assert!(EncryptedBlob::parse("zz:bb:cc").is_err());
        // right shape, wrong iv length
        assert!(EncryptedBlob::parse("aabb:00112233445566778899aabbccddeeff:00").is_err());
    }
}
