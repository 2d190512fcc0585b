//! Integrity checks for downloaded model weights.

use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::Path;

use sha2::Digest as _;

use crate::foundation::error::{DiscoError, DiscoResult};

/// Published SHA-256 of the 512x512 unconditional diffusion checkpoint.
pub const DIFFUSION_512_SHA256: &str =
    "9c111ab89e214862b76e1fa6a1b3f1d329b1a88281885943d2cdbe357ad57648";

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex(&sha2::Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, streamed in chunks.
pub fn file_sha256(path: impl AsRef<Path>) -> DiscoResult<String> {
    let path = path.as_ref();
    let f = File::open(path)
        .map_err(|e| DiscoError::io(format!("open checkpoint '{}': {e}", path.display())))?;
    let mut reader = BufReader::new(f);
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| DiscoError::io(format!("read checkpoint '{}': {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

/// Result of comparing a file against its expected digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    /// Digest matches.
    Match,
    /// Digest differs; the file should be fetched again.
    Mismatch {
        /// Digest of the file on disk.
        actual: String,
    },
}

/// Compare a file's SHA-256 with `expected` (hex, case-insensitive).
pub fn verify_file(path: impl AsRef<Path>, expected: &str) -> DiscoResult<Verification> {
    let path = path.as_ref();
    let actual = file_sha256(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        tracing::debug!(path = %path.display(), "checkpoint digest matches");
        Ok(Verification::Match)
    } else {
        tracing::warn!(path = %path.display(), %actual, "checkpoint digest mismatch");
        Ok(Verification::Mismatch { actual })
    }
}

#[cfg(test)]
#[path = "../tests/unit/checkpoint.rs"]
mod tests;
