//! Content checksums for round-trip integrity verification.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

/// SHA-256 digest of a byte slice, hex encoded.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 digest of a file's contents, hex encoded.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)?;
    Ok(sha256_hex(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_same_content_same_digest() {
        let data = vec![0x5au8; 1 << 16];
        assert_eq!(sha256_hex(&data), sha256_hex(&data.clone()));
    }

    #[test]
    fn test_file_digest_matches_slice_digest() {
        let dir = std::env::temp_dir();
        let path = dir.join("faultline-checksum-test.bin");
        std::fs::write(&path, b"payload").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(b"payload"));
        let _ = std::fs::remove_file(&path);
    }
}
