//! Stable hashing helpers used for idempotent ledger reservations and
//! content-addressed artifact keys.

use blake3::Hasher;

const SEP: u8 = 0x1f;

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[SEP]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Deterministic reservation key for a quota/privacy-budget reservation.
///
/// Two reserve calls with the same `(owner_id, period_yyyymm, job_id)` hash
/// to the same key, so a caller that retries a reservation after a network
/// blip commits or releases the same row rather than double-reserving.
pub fn reservation_key(owner_id: &str, period_yyyymm: &str, job_id: &str) -> String {
    hash_parts(&[owner_id, period_yyyymm, job_id])
}

/// Content key for a generated artifact, used as the storage object key.
pub fn artifact_key(job_id: &str, output_key_hint: &str) -> String {
    hash_parts(&[job_id, output_key_hint])
}
