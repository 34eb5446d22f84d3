//! Domain primitive types used across the hatch workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TAG, LIBRARY_NAMESPACE, SCRATCH_IMAGE, SHA256_HEX_LENGTH};
use crate::error::{HatchError, Result};

/// Unique identifier for one sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(String);

impl SandboxId {
    /// Generates a random sandbox ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `name[:tag]` reference to an image in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    name: String,
    tag: String,
}

impl ImageReference {
    /// Parses a `name[:tag]` reference; the tag defaults to `latest`.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::InvalidReference` if the name or tag is empty or
    /// contains characters a registry would not accept.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| HatchError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let last_segment_start = reference.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match reference[last_segment_start..].rfind(':') {
            Some(i) => {
                let split = last_segment_start + i;
                (&reference[..split], &reference[split + 1..])
            }
            None => (reference, DEFAULT_TAG),
        };

        if name.is_empty() {
            return Err(invalid("empty image name"));
        }
        if !name.chars().all(is_name_char) {
            return Err(invalid("name must use lowercase letters, digits, '.', '_', '-' or '/'"));
        }
        if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return Err(invalid("name has an empty path component"));
        }
        if tag.is_empty() {
            return Err(invalid("empty tag"));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
            return Err(invalid("tag must use letters, digits, '.', '_' or '-'"));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Returns the image name as given (`alpine`, `bitnami/redis`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the registry repository path, e.g. `library/alpine`.
    #[must_use]
    pub fn repository(&self) -> String {
        if self.name.contains('/') {
            self.name.clone()
        } else {
            format!("{LIBRARY_NAMESPACE}/{}", self.name)
        }
    }

    /// Returns the token scope granting pull access to this repository.
    #[must_use]
    pub fn pull_scope(&self) -> String {
        format!("repository:{}:pull", self.repository())
    }

    /// Returns whether this is the empty `scratch` image.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.name == SCRATCH_IMAGE
    }
}

impl FromStr for ImageReference {
    type Err = HatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
}

/// Content-addressed identifier of one layer blob (`algorithm:hex`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayerDigest {
    algorithm: String,
    hex: String,
}

impl LayerDigest {
    /// Parses an `algorithm:hex` digest.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::InvalidDigest` if the string is not of that form,
    /// or if a `sha256` digest is not 64 lowercase hex characters.
    pub fn parse(digest: &str) -> Result<Self> {
        let invalid = || HatchError::InvalidDigest {
            digest: digest.to_string(),
        };
        let (algorithm, hex) = digest.split_once(':').ok_or_else(invalid)?;
        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-'));
        let hex_ok = !hex.is_empty() && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !algorithm_ok || !hex_ok {
            return Err(invalid());
        }
        if algorithm == "sha256" && hex.len() != SHA256_HEX_LENGTH {
            return Err(invalid());
        }
        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    /// Returns the hash algorithm, e.g. `sha256`.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the hex-encoded hash, used as the scratch file stem.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl TryFrom<String> for LayerDigest {
    type Error = HatchError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LayerDigest> for String {
    fn from(digest: LayerDigest) -> Self {
        digest.to_string()
    }
}

impl fmt::Display for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Normalized termination status of the sandboxed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchResult {
    /// Exit code the launcher must exit with.
    pub exit_code: u8,
    /// Whether the command was terminated by a signal.
    pub signaled: bool,
}

impl LaunchResult {
    /// Result of a command that exited normally with `code`.
    #[must_use]
    pub const fn exited(code: u8) -> Self {
        Self {
            exit_code: code,
            signaled: false,
        }
    }

    /// Result of a command killed by `signal`, encoded as `128 + signal`.
    #[must_use]
    pub const fn killed(signal: u8) -> Self {
        Self {
            exit_code: crate::constants::SIGNAL_EXIT_OFFSET.saturating_add(signal),
            signaled: true,
        }
    }

    /// Returns whether the command exited normally with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0 && !self.signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPINE_LAYER: &str = "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4";

    #[test]
    fn reference_without_tag_defaults_to_latest() {
        let r = ImageReference::parse("alpine").expect("parse");
        assert_eq!(r.name(), "alpine");
        assert_eq!(r.tag(), "latest");
        assert_eq!(r.to_string(), "alpine:latest");
    }

    #[test]
    fn reference_with_tag_splits_on_last_colon() {
        let r = ImageReference::parse("ubuntu:22.04").expect("parse");
        assert_eq!(r.name(), "ubuntu");
        assert_eq!(r.tag(), "22.04");
    }

    #[test]
    fn single_component_names_live_in_library() {
        let r = ImageReference::parse("alpine:3.19").expect("parse");
        assert_eq!(r.repository(), "library/alpine");
        assert_eq!(r.pull_scope(), "repository:library/alpine:pull");
    }

    #[test]
    fn namespaced_names_are_used_verbatim() {
        let r = ImageReference::parse("bitnami/redis:7").expect("parse");
        assert_eq!(r.repository(), "bitnami/redis");
        assert_eq!(r.pull_scope(), "repository:bitnami/redis:pull");
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse(":latest").is_err());
        assert!(ImageReference::parse("alpine:").is_err());
        assert!(ImageReference::parse("Alpine").is_err());
        assert!(ImageReference::parse("al pine").is_err());
        assert!(ImageReference::parse("a//b").is_err());
    }

    #[test]
    fn scratch_is_recognized() {
        assert!(ImageReference::parse("scratch").expect("parse").is_scratch());
        assert!(!ImageReference::parse("alpine").expect("parse").is_scratch());
    }

    #[test]
    fn digest_parses_algorithm_and_hex() {
        let d = LayerDigest::parse(ALPINE_LAYER).expect("parse");
        assert_eq!(d.algorithm(), "sha256");
        assert_eq!(d.hex().len(), 64);
        assert_eq!(d.to_string(), ALPINE_LAYER);
    }

    #[test]
    fn digest_rejects_malformed_input() {
        assert!(LayerDigest::parse("sha256").is_err());
        assert!(LayerDigest::parse("sha256:abc").is_err());
        assert!(LayerDigest::parse(":abcd").is_err());
        assert!(LayerDigest::parse("sha256:../../etc/passwd").is_err());
    }

    #[test]
    fn digest_deserializes_from_json_string() {
        let json = format!("\"{ALPINE_LAYER}\"");
        let d: LayerDigest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(d.to_string(), ALPINE_LAYER);
    }

    #[test]
    fn launch_result_encodes_signals_above_128() {
        assert_eq!(LaunchResult::exited(42).exit_code, 42);
        let killed = LaunchResult::killed(9);
        assert_eq!(killed.exit_code, 137);
        assert!(killed.signaled);
        assert!(!killed.success());
        assert!(LaunchResult::exited(0).success());
    }

    #[test]
    fn sandbox_ids_are_unique() {
        assert_ne!(SandboxId::generate(), SandboxId::generate());
    }
}
