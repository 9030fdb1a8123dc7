//! SHA-256 helpers for dataset checksums and provenance digests.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &std::path::Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(sha256_hex(&bytes))
}

/// Digest of a parameters document. `serde_json` serializes maps with
/// sorted keys, so equal parameter sets hash identically regardless of
/// insertion order.
pub fn params_digest(params: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(params).unwrap_or_default();
    sha256_hex(serialized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn params_digest_is_order_independent() {
        let a = serde_json::json!({"alpha": 1, "beta": 2});
        let b = serde_json::json!({"beta": 2, "alpha": 1});
        assert_eq!(params_digest(&a), params_digest(&b));
    }
}
