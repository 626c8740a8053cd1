//! Hashing utilities for source verification.
//!
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing
//! - `file_matches_digest()`: cache validation for downloaded artifacts

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA256 hash for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Compares against a declared digest, ignoring hex case and surrounding whitespace.
  pub fn matches(&self, expected: &str) -> bool {
    self.0.eq_ignore_ascii_case(expected.trim())
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// True when `path` exists, a digest is declared, and the file hashes to it.
pub fn file_matches_digest(path: &Path, expected: Option<&str>) -> bool {
  let Some(expected) = expected.filter(|d| !d.trim().is_empty()) else {
    return false;
  };
  match hash_file(path) {
    Ok(actual) => actual.matches(expected),
    Err(_) => false,
  }
}
