//! Cache key normalization
//!
//! Keys become filenames in the persistent tier and keys in the distributed
//! store, so they must be `[A-Za-z0-9_-]`. Keys already in that alphabet pass
//! through unchanged. Any other key is replaced by its SHA-256 digest, so two
//! distinct keys never share a slot.

use crate::constants::defaults::MAX_KEY_LENGTH;
use sha2::{Digest, Sha256};

/// Prefix marking a hashed key
pub const HASHED_KEY_PREFIX: &str = "h_";

pub fn normalize_key(raw: &str) -> String {
    if is_safe(raw) {
        raw.to_string()
    } else {
        hash_key(raw)
    }
}

fn is_safe(raw: &str) -> bool {
    // Passthrough keys must never look like digests
    !raw.is_empty()
        && raw.len() <= MAX_KEY_LENGTH
        && !raw.starts_with(HASHED_KEY_PREFIX)
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn hash_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("{HASHED_KEY_PREFIX}{}", hex::encode(digest))
}
