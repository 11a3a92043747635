//! Streaming hash computation for archives and extracted members.
//!
//! Provides SHA256 over raw bytes (the primary content key) and over
//! whitespace-canonicalized text (`sha_family`), which identifies files that
//! differ only in formatting: line endings, trailing blank lines, re-wrapped
//! whitespace. Repackaged scientific data distributions produce such
//! near-duplicates routinely.

use crate::error::{IndexError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (8MB).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Compute the SHA256 of a byte slice as lowercase hex.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA256 of a file with chunked reads.
///
/// Produces the same digest as hashing the whole buffer at once.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| IndexError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| IndexError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the `sha_family` digest: SHA256 over the text with every Unicode
/// whitespace character removed.
///
/// Fails when the canonicalized string is empty — a whitespace-only file is
/// corrupt, not indexable.
pub fn sha256_canonical_text(text: &str) -> Result<String> {
    let canonical: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if canonical.is_empty() {
        return Err(IndexError::EmptyCanonicalText {
            context: "input text".to_string(),
        });
    }
    debug_assert!(!canonical.chars().any(char::is_whitespace));

    Ok(sha256_bytes(canonical.as_bytes()))
}
