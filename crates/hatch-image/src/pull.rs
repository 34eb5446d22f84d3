//! Pulling an image into a directory.

use std::path::Path;

use hatch_common::error::Result;
use hatch_common::types::ImageReference;

use crate::layer::{AppliedLayer, LayerMaterializer};
use crate::registry::RegistryClient;
use crate::transport::Transport;

/// Resolves `image` and applies its layers to `target_root` in manifest order.
///
/// Each blob is downloaded only when the previous layer has been applied,
/// so at most one archive is held in memory or on disk at a time.
///
/// # Errors
///
/// Returns the first registry or extraction error; layers applied before
/// the failure stay in `target_root`.
pub fn pull_image<T: Transport>(
    client: &RegistryClient<T>,
    materializer: &LayerMaterializer,
    image: &ImageReference,
    target_root: &Path,
) -> Result<Vec<AppliedLayer>> {
    let resolved = client.resolve(image)?;
    let token = resolved.token.as_ref();
    let blobs = resolved
        .manifest
        .layers()
        .iter()
        .map(|digest| client.fetch(image, digest, token));

    let applied = materializer.extract(blobs, target_root)?;
    tracing::info!(image = %image, layers = applied.len(), root = %target_root.display(), "image materialized");
    Ok(applied)
}
