use sha2::{Digest, Sha256};

/// Computes SHA-256 of data and returns it as a hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
