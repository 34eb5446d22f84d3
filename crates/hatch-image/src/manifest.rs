//! Image manifest parsing.
//!
//! Two single-image formats are understood:
//! - schema 1 (`fsLayers[].blobSum`), the legacy signed layer list;
//! - schema 2 / OCI image manifest (`layers[].digest`).
//!
//! The layer list is kept exactly in the order the registry sent it, and
//! that order is the order layers are applied in. Manifest lists and OCI
//! indexes are rejected: platform negotiation is not implemented.

use hatch_common::constants::{MANIFEST_LIST_MEDIA_TYPES, MAX_IMAGE_LAYERS};
use hatch_common::error::{HatchError, Result};
use hatch_common::types::LayerDigest;
use serde::Deserialize;

/// Ordered layer list of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    schema_version: u32,
    layers: Vec<LayerDigest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    schema_version: Option<u32>,
    media_type: Option<String>,
    #[serde(default)]
    fs_layers: Vec<FsLayer>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    manifests: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FsLayer {
    blob_sum: LayerDigest,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: LayerDigest,
}

impl Manifest {
    /// Parses a manifest body; `content_type` is the response header, if any.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::UnsupportedManifest` for manifest lists and
    /// `HatchError::InvalidManifest` for bodies that are not JSON, carry an
    /// unknown schema version, malformed digests, or no layers at all.
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self> {
        let invalid = |message: String| HatchError::InvalidManifest { message };
        let raw: RawManifest = serde_json::from_slice(body).map_err(|e| invalid(e.to_string()))?;

        let media_type = raw
            .media_type
            .as_deref()
            .or_else(|| content_type.map(|c| c.split(';').next().unwrap_or(c).trim()));
        if let Some(media_type) = media_type.filter(|m| MANIFEST_LIST_MEDIA_TYPES.contains(m)) {
            return Err(HatchError::UnsupportedManifest {
                media_type: media_type.to_string(),
            });
        }
        if raw.manifests.is_some() {
            return Err(HatchError::UnsupportedManifest {
                media_type: media_type.unwrap_or("image index").to_string(),
            });
        }

        let schema_version = raw
            .schema_version
            .ok_or_else(|| invalid("missing schemaVersion".into()))?;
        let layers: Vec<LayerDigest> = match schema_version {
            1 => raw.fs_layers.into_iter().map(|l| l.blob_sum).collect(),
            2 => raw.layers.into_iter().map(|l| l.digest).collect(),
            other => return Err(invalid(format!("unknown schemaVersion {other}"))),
        };

        if layers.is_empty() {
            return Err(invalid("manifest lists no layers".into()));
        }
        if layers.len() > MAX_IMAGE_LAYERS {
            return Err(invalid(format!(
                "{} layers exceeds the limit of {MAX_IMAGE_LAYERS}",
                layers.len()
            )));
        }
        Ok(Self {
            schema_version,
            layers,
        })
    }

    /// Returns the layers in application order.
    #[must_use]
    pub fn layers(&self) -> &[LayerDigest] {
        &self.layers
    }

    /// Returns the manifest schema version (1 or 2).
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }
}
