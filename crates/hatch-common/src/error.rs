//! Unified error types for the hatch workspace.
//!
//! Every fallible operation in the workspace returns [`HatchError`]. The
//! variants group into a small set of [`ErrorKind`]s so the CLI can report
//! launcher failures distinctly from the sandboxed command's own exit code.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HatchError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The executable path cannot be reproduced inside a sandbox root.
    #[error("invalid executable path {path}: {reason}")]
    InvalidExecutable {
        /// The path as given by the caller.
        path: PathBuf,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An image reference could not be parsed.
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference {
        /// The reference as given by the caller.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry could not be reached (DNS, connect, TLS, body read).
    #[error("request to {url} failed: {message}")]
    Transport {
        /// URL of the failed request.
        url: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The registry answered with a status the protocol does not allow here.
    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus {
        /// URL of the request.
        url: String,
        /// HTTP status code received.
        status: u16,
    },

    /// The `WWW-Authenticate` header was missing or malformed.
    #[error("invalid auth challenge: {message}")]
    InvalidChallenge {
        /// Description of the problem.
        message: String,
    },

    /// The token endpoint answered without a token.
    #[error("no token in auth response from {realm}")]
    MissingToken {
        /// Realm URL that was queried.
        realm: String,
    },

    /// The manifest body could not be interpreted.
    #[error("invalid manifest: {message}")]
    InvalidManifest {
        /// Description of the problem.
        message: String,
    },

    /// The registry returned a manifest kind this tool does not handle.
    #[error("unsupported manifest type {media_type}")]
    UnsupportedManifest {
        /// Media type reported by the registry.
        media_type: String,
    },

    /// A layer digest string is not of the form `algorithm:hex`.
    #[error("invalid digest {digest:?}")]
    InvalidDigest {
        /// The rejected digest string.
        digest: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// A layer archive could not be unpacked.
    #[error("failed to extract {archive}: {message}")]
    Extraction {
        /// Scratch archive being extracted.
        archive: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A layer member would have been written outside the target root.
    #[error("layer entry escapes the target root: {path}")]
    UnsafeEntry {
        /// Path of the offending archive member.
        path: PathBuf,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The process has already been moved into a sandbox.
    #[error("process is already sandboxed")]
    AlreadySandboxed,

    /// The platform lacks a required isolation primitive.
    #[error("unsupported on this platform: {message}")]
    Unsupported {
        /// Description of the missing capability.
        message: String,
    },

    /// The target command could not be started.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Command that failed to start.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Coarse classification of a [`HatchError`], used in user-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input: missing executable, unparseable reference.
    Input,
    /// Registry exchange failed.
    Registry,
    /// A layer could not be materialized.
    Extraction,
    /// Namespace or root change failed, usually a missing capability.
    Sandbox,
    /// Anything else: local I/O, configuration, spawning.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Registry => write!(f, "registry"),
            Self::Extraction => write!(f, "extraction"),
            Self::Sandbox => write!(f, "sandbox"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl HatchError {
    /// Returns the category this error is reported under.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::InvalidExecutable { .. } => ErrorKind::Input,
            Self::InvalidReference { .. }
            | Self::Transport { .. }
            | Self::UnexpectedStatus { .. }
            | Self::InvalidChallenge { .. }
            | Self::MissingToken { .. }
            | Self::InvalidManifest { .. }
            | Self::UnsupportedManifest { .. }
            | Self::InvalidDigest { .. }
            | Self::HashMismatch { .. } => ErrorKind::Registry,
            Self::Extraction { .. } | Self::UnsafeEntry { .. } => ErrorKind::Extraction,
            Self::PermissionDenied { .. } | Self::AlreadySandboxed | Self::Unsupported { .. } => {
                ErrorKind::Sandbox
            }
            Self::Io { .. } | Self::Config { .. } | Self::Spawn { .. } | Self::Serialization { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HatchError>;
