//! SHA-256 content identity for inbox files.
//!
//! Computed once when a file is enqueued and again right before the worker
//! processes it; the two must match byte for byte.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default read size when streaming a file through the hasher.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Lowercase hex SHA-256 of a file's exact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Parses a 64-character hex string. Uppercase input is normalized.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("not a SHA-256 hex digest: {}", value))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

/// Hashes everything `reader` yields, `chunk_size` bytes at a time.
pub fn digest_reader<R: Read>(mut reader: R, chunk_size: usize) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest(hex::encode(hasher.finalize())))
}

/// Hashes the file at `path`.
pub fn digest_file(path: &Path, chunk_size: usize) -> std::io::Result<ContentDigest> {
    let file = File::open(path)?;
    digest_reader(file, chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let digest = digest_reader(&b"hello world"[..], DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(
            digest.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digest.short(), "b94d27b9934d");
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let small = digest_reader(&data[..], 7).unwrap();
        let large = digest_reader(&data[..], DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_digest_file_matches_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let from_file = digest_file(&path, 4).unwrap();
        let from_bytes = digest_reader(&b"a,b\n1,2\n"[..], 4).unwrap();
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = digest_file(Path::new("/nonexistent/intake/file.csv"), 16).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_from_hex_validation() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let parsed = ContentDigest::from_hex(upper).unwrap();
        assert_eq!(parsed.as_str(), upper.to_ascii_lowercase());

        assert!(ContentDigest::from_hex("abc").is_none());
        assert!(ContentDigest::from_hex(&"z".repeat(64)).is_none());
    }

    #[test]
    fn test_serde_round_trip_rejects_garbage() {
        let digest = digest_reader(&b"x"[..], 16).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);

        assert!(serde_json::from_str::<ContentDigest>("\"nope\"").is_err());
    }
}
