//! Cache key derivation.

use sha2::{Digest, Sha256};

/// File name for the entry cached under `key`: lowercase hex SHA-256.
pub fn entry_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
