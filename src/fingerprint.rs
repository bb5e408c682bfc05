//! Content fingerprints for duplicate detection.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's bytes. Hashing never
//! fails from the caller's point of view: an unreadable file yields the empty
//! string, which [`matches`] treats as matching nothing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUF_BYTES: usize = 64 * 1024;

/// Hash a file's contents. Returns `""` (and logs) on any I/O error.
pub fn fingerprint_file(path: &Path) -> String {
    match hash_file(path) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "error hashing file");
            String::new()
        }
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Two fingerprints match only when both are real hashes and equal.
pub fn matches(a: &str, b: &str) -> bool {
    !a.is_empty() && a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fingerprint_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    #[test]
    fn file_hash_equals_byte_hash() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        let body = "x".repeat(200_000);
        std::fs::write(&path, &body).unwrap();
        assert_eq!(fingerprint_file(&path), fingerprint_bytes(body.as_bytes()));
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            fingerprint_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_yields_sentinel() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(fingerprint_file(&tmp.path().join("missing.txt")), "");
    }

    #[test]
    fn sentinel_never_matches() {
        assert!(!matches("", ""));
        assert!(matches("ab12", "ab12"));
        assert!(!matches("ab12", "ab13"));
    }
}
