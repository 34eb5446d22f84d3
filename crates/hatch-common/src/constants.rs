//! System-wide constants and default paths.

use std::path::PathBuf;

/// Registry queried when no `--registry` is given.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Tag used when an image reference does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// Repository namespace for single-component image names.
pub const LIBRARY_NAMESPACE: &str = "library";

/// Image reference meaning "no image": only the executable is staged.
pub const SCRATCH_IMAGE: &str = "scratch";

/// Prefix of every sandbox root directory name.
pub const SANDBOX_PREFIX: &str = "hatch-";

/// Suffix of the per-sandbox scratch directory holding downloaded blobs.
pub const SCRATCH_SUFFIX: &str = ".blobs";

/// Extension given to downloaded layer archives.
pub const LAYER_ARCHIVE_EXTENSION: &str = "tar";

/// Prefix marking an OCI whiteout entry.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Whiteout entry marking its directory as opaque.
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum number of layers accepted in a manifest.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// Offset added to a terminating signal number to form an exit code.
pub const SIGNAL_EXIT_OFFSET: u8 = 128;

/// Exit code used for launcher failures.
pub const LAUNCHER_FAILURE_EXIT: u8 = 1;

/// Manifest media types offered in the `Accept` header, most preferred first.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.v1+prettyjws",
    "application/vnd.docker.distribution.manifest.v1+json",
];

/// Manifest media types that describe a list of per-platform manifests.
pub const MANIFEST_LIST_MEDIA_TYPES: &[&str] = &[
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.oci.image.index.v1+json",
];

/// Application name used in CLI output.
pub const APP_NAME: &str = "hatch";

/// Returns the default directory under which sandboxes are created.
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}
