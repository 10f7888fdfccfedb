//! Hashing and HMAC signing helpers.
//!
//! `sha256` grounds the content-hash half of artifact addressing; `hmac_sign`
//! / `verify_hmac` back the Storage Adapter's signed-URL scheme (spec.md
//! §6: `StorageAdapter::sign` returns a time-limited, tamper-evident URL).

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SEP: u8 = 0x1f;

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 digest over several separated parts, used when a
/// hash needs to mix together fields that individually could collide
/// (e.g. a key plus an expiry timestamp).
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([SEP]);
    }
    hex::encode(hasher.finalize())
}

/// Sign `message` with `key`, returning a hex-encoded HMAC-SHA256 tag.
pub fn hmac_sign(key: &[u8], message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a previously produced signature in constant time.
pub fn verify_hmac(key: &[u8], message: &str, signature_hex: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    mac.verify_slice(&expected_bytes).is_ok()
}
