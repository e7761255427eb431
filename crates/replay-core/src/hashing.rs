//! Streaming SHA-256 hashing for cache keys and resource identity.
//!
//! The digest is the stable identity of a piece of content: equal bytes hash
//! equal regardless of filename, origin URL, or discovery time.

use crate::error::{ReplayError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (8MB, optimal for SSDs).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Compute the SHA-256 of in-memory bytes as a lowercase hex string.
///
/// Accepts anything byte-like, including `&str`.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 of a file's contents as a lowercase hex string.
///
/// Reads in fixed-size chunks so arbitrarily large files never land in
/// memory at once. I/O errors propagate with path context.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ReplayError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ReplayError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_input() {
        // SHA-256 of empty input
        assert_eq!(
            sha256_hex([]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_deterministic() {
        let a = sha256_hex("Hello, World!");
        let b = sha256_hex("Hello, World!");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 is 32 bytes = 64 hex chars
    }

    #[test]
    fn test_distinct_inputs_differ() {
        assert_ne!(sha256_hex("Hello, World!"), sha256_hex("Hello, World?"));
        assert_ne!(sha256_hex([0u8]), sha256_hex([0u8, 0u8]));
    }

    #[test]
    fn test_file_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        assert_eq!(sha256_file(file.path()).unwrap(), sha256_hex("test content"));
    }

    #[test]
    fn test_missing_file_propagates() {
        let result = sha256_file("/nonexistent/replay/input.bin");
        assert!(result.is_err());
    }
}
