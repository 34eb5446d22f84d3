//! SHA-256 content verification.
//!
//! Validates the integrity of downloaded layer blobs against their digest.

use hatch_common::error::{HatchError, Result};
use hatch_common::types::LayerDigest;
use sha2::{Digest, Sha256};

/// Computes the hex-encoded SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Validates that `data` hashes to `digest`.
///
/// Digests using an algorithm other than `sha256` are accepted unchecked.
///
/// # Errors
///
/// Returns `HatchError::HashMismatch` if the hashes do not match.
pub fn verify_digest(digest: &LayerDigest, data: &[u8]) -> Result<()> {
    if digest.algorithm() != "sha256" {
        tracing::debug!(digest = %digest, "skipping verification of non-sha256 digest");
        return Ok(());
    }
    let actual = sha256_hex(data);
    if actual != digest.hex() {
        return Err(HatchError::HashMismatch {
            resource: digest.to_string(),
            expected: digest.hex().to_string(),
            actual,
        });
    }
    tracing::debug!(digest = %digest, "digest verified");
    Ok(())
}
