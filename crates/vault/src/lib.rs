//! Credential vault: authenticated encryption of platform secrets at rest,
//! plus API-key generation, hashing, and masking.
//!
//! Plaintext credentials exist only in process memory; the storage form is
//! the portable `hex(iv):hex(tag):hex(ciphertext)` triple produced by
//! [`CredentialVault::encrypt`].

pub mod cipher;
pub mod error;
pub mod keys;
pub mod vault;

pub use {
    cipher::{Aes256GcmCipher, Cipher, EncryptedBlob},
    error::VaultError,
    keys::{
        KEY_PREFIX_LEN, KEY_SUFFIX_LEN, KeyEnv, generate_api_key, hash_api_key, key_prefix,
        key_suffix, mask_key, random_token, verify_api_key_hash,
    },
    vault::CredentialVault,
};
