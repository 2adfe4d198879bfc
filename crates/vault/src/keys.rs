//! API-key material: generation, one-way hashing, masking.
//!
//! A key secret has the shape `gk_<env>_<base64url(32 bytes)>`. Only the
//! SHA-256 hash plus a display prefix/suffix are ever stored.

use {
    base64::Engine,
    rand::RngCore,
    sha2::{Digest, Sha256},
    subtle::ConstantTimeEq,
};

/// Stored display prefix: enough to locate the row and recognize the key.
pub const KEY_PREFIX_LEN: usize = 12;

/// Stored display suffix.
pub const KEY_SUFFIX_LEN: usize = 4;

/// Key environment embedded in the secret itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnv {
    Live,
    Test,
    Restricted,
}

impl KeyEnv {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
            Self::Restricted => "restricted",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "live" => Some(Self::Live),
            "test" => Some(Self::Test),
            "restricted" => Some(Self::Restricted),
            _ => None,
        }
    }
}

/// Generate a fresh API key from 32 CSPRNG bytes.
#[must_use]
pub fn generate_api_key(env: KeyEnv) -> String {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    format!(
        "gk_{}_{}",
        env.as_str(),
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret)
    )
}

/// Opaque URL-safe token (webhook routing keys and the like).
#[must_use]
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// SHA-256 hex digest of the full key string. One-way; the plaintext is
/// never persisted.
#[must_use]
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[must_use]
pub fn key_prefix(key: &str) -> &str {
    &key[..key.len().min(KEY_PREFIX_LEN)]
}

#[must_use]
pub fn key_suffix(key: &str) -> &str {
    &key[key.len().saturating_sub(KEY_SUFFIX_LEN)..]
}

/// Display mask shown in listings, e.g. `gk_live_AbCd...wxyz`.
#[must_use]
pub fn mask_key(prefix: &str, suffix: &str) -> String {
    format!("{prefix}...{suffix}")
}

/// Compare a presented key against a stored SHA-256 hex digest in constant
/// time. Returns false for any malformed stored digest.
#[must_use]
pub fn verify_api_key_hash(presented: &str, stored_hash_hex: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hash_hex) else {
        return false;
    };
    let computed = Sha256::digest(presented.as_bytes());
    computed.as_slice().ct_eq(stored.as_slice()).into()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_shape() {
        let key = generate_api_key(KeyEnv::Live);
        assert!(key.starts_with("gk_live_"));
        // 32 bytes base64url without padding is 43 chars.
        assert_eq!(key.len(), "gk_live_".len() + 43);
    }

    #[test]
    fn distinct_keys_distinct_hashes() {
        let a = generate_api_key(KeyEnv::Test);
        let b = generate_api_key(KeyEnv::Test);
        assert_ne!(a, b);
        assert_ne!(hash_api_key(&a), hash_api_key(&b));
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let digest = hash_api_key("gk_test_abc");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prefix_suffix_and_mask() {
        let key = "gk_live_AbCdEfGhIjKlMnOpQrStUvWxYz0123456789abc";
        assert_eq!(key_prefix(key), "gk_live_AbCd");
        assert_eq!(key_suffix(key), "9abc");
        assert_eq!(mask_key(key_prefix(key), key_suffix(key)), "gk_live_AbCd...9abc");
    }

    #[test]
    fn verify_accepts_matching_hash_only() {
        let key = generate_api_key(KeyEnv::Restricted);
        let digest = hash_api_key(&key);
        assert!(verify_api_key_hash(&key, &digest));
        assert!(!verify_api_key_hash("gk_restricted_other", &digest));
        assert!(!verify_api_key_hash(&key, "not-hex"));
    }

    #[test]
    fn key_env_parse_round_trips() {
        for env in [KeyEnv::Live, KeyEnv::Test, KeyEnv::Restricted] {
            assert_eq!(KeyEnv::parse(env.as_str()), Some(env));
        }
        assert_eq!(KeyEnv::parse("prod"), None);
    }

    #[test]
    fn random_tokens_are_unique_and_url_safe() {
        let a = random_token(24);
        let b = random_token(24);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
