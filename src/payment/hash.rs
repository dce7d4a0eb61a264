//! Secure hash over gateway parameters.
//!
//! The signed string is every `vpc_*`/`user*` parameter with a non-blank
//! value, except the hash fields themselves, sorted by key and joined as
//! `key=value&key=value` with raw values. The HMAC key is the hex-decoded
//! merchant secret; the digest is upper-case hex.

use std::collections::BTreeMap;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

/// Parameter carrying the hash.
pub const SECURE_HASH_KEY: &str = "vpc_SecureHash";
/// Parameter naming the hash algorithm.
pub const SECURE_HASH_TYPE_KEY: &str = "vpc_SecureHashType";

const SIGNED_PREFIXES: [&str; 2] = ["vpc_", "user"];

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("Secure secret is not valid hex: {0}")]
    InvalidSecret(#[from] hex::FromHexError),

    #[error("Secure secret is empty")]
    EmptySecret,

    #[error("Invalid HMAC key length")]
    InvalidKeyLength,
}

/// HMAC variant. The installment-options endpoint signs with SHA-512.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Value sent as `vpc_SecureHashType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

/// The string that gets signed.
pub fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(key, value)| {
            SIGNED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
                && key.as_str() != SECURE_HASH_KEY
                && key.as_str() != SECURE_HASH_TYPE_KEY
                && !value.trim().is_empty()
        })
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, HashError> {
    let key = hex::decode(secret.trim())?;
    if key.is_empty() {
        return Err(HashError::EmptySecret);
    }
    Ok(key)
}

fn keyed<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> Result<M, HashError> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| HashError::InvalidKeyLength)?;
    mac.update(message);
    Ok(mac)
}

fn digest(key: &[u8], message: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>, HashError> {
    Ok(match algorithm {
        HashAlgorithm::Sha256 => {
            keyed::<HmacSha256>(key, message)?.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha512 => {
            keyed::<HmacSha512>(key, message)?.finalize().into_bytes().to_vec()
        }
    })
}

/// Upper-case hex HMAC of the canonical string.
pub fn secure_hash(
    params: &BTreeMap<String, String>,
    secret: &str,
    algorithm: HashAlgorithm,
) -> Result<String, HashError> {
    let key = decode_secret(secret)?;
    Ok(hex::encode_upper(digest(&key, canonical_string(params).as_bytes(), algorithm)?))
}

/// Constant-time check of `received` against the hash of `params`.
///
/// Case-insensitive. A blank or non-hex received hash, or an unusable
/// secret, never verifies.
pub fn verify(
    params: &BTreeMap<String, String>,
    received: &str,
    secret: &str,
    algorithm: HashAlgorithm,
) -> bool {
    let received = received.trim();
    if received.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(received.to_ascii_uppercase()) else {
        return false;
    };
    let Ok(key) = decode_secret(secret) else {
        return false;
    };
    let message = canonical_string(params);

    let verified = match algorithm {
        HashAlgorithm::Sha256 => {
            keyed::<HmacSha256>(&key, message.as_bytes()).map(|mac| mac.verify_slice(&expected))
        }
        HashAlgorithm::Sha512 => {
            keyed::<HmacSha512>(&key, message.as_bytes()).map(|mac| mac.verify_slice(&expected))
        }
    };
    matches!(verified, Ok(Ok(())))
}
