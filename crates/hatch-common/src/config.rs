//! Global configuration model for the hatch launcher.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for one launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatchConfig {
    /// Base URL of the image registry, without a trailing slash.
    pub registry_url: String,
    /// Directory under which sandbox roots are created.
    pub work_dir: PathBuf,
    /// Retry behaviour for transient registry failures.
    pub retry: RetryPolicy,
    /// Whether downloaded blobs are checked against their digest.
    pub verify_digests: bool,
}

impl Default for HatchConfig {
    fn default() -> Self {
        Self {
            registry_url: crate::constants::DEFAULT_REGISTRY_URL.to_string(),
            work_dir: crate::constants::default_work_dir(),
            retry: RetryPolicy::default(),
            verify_digests: true,
        }
    }
}

/// Bounded retry with exponential backoff.
///
/// Only transport failures and 5xx responses are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}
