//! Layer materialization.
//!
//! Each blob is written to a scratch archive, unpacked over the target root,
//! and the scratch file is removed again. Layers are applied strictly in the
//! order given, so a later layer overwrites whatever an earlier one put at
//! the same path. OCI whiteouts remove paths created by earlier layers.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use hatch_common::constants::{LAYER_ARCHIVE_EXTENSION, OPAQUE_WHITEOUT, WHITEOUT_PREFIX};
use hatch_common::error::{HatchError, Result};
use hatch_common::types::LayerDigest;

use crate::registry::Blob;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A layer that has been unpacked into a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedLayer {
    /// Digest of the layer.
    pub digest: LayerDigest,
    /// Size of the downloaded archive in bytes.
    pub size_bytes: u64,
}

/// Unpacks layer blobs into a root directory via scratch archives.
#[derive(Debug, Clone)]
pub struct LayerMaterializer {
    scratch_dir: PathBuf,
}

impl LayerMaterializer {
    /// Creates a materializer writing scratch archives under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Returns the directory scratch archives are written to.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Applies `blobs` to `target_root` in iteration order.
    ///
    /// Blobs are consumed lazily, so a download can be interleaved with
    /// extraction; the first error stops the sequence.
    ///
    /// # Errors
    ///
    /// Returns the first download or extraction error.
    pub fn extract<I>(&self, blobs: I, target_root: &Path) -> Result<Vec<AppliedLayer>>
    where
        I: IntoIterator<Item = Result<Blob>>,
    {
        let mut applied = Vec::new();
        for blob in blobs {
            applied.push(self.apply(&blob?, target_root)?);
        }
        Ok(applied)
    }

    /// Persists one blob, unpacks it over `target_root`, and deletes it.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::NotFound` if the target root does not exist,
    /// `HatchError::Extraction` if the archive is corrupt, and
    /// `HatchError::UnsafeEntry` if a member would escape the root.
    pub fn apply(&self, blob: &Blob, target_root: &Path) -> Result<AppliedLayer> {
        if !target_root.is_dir() {
            return Err(HatchError::NotFound {
                kind: "target root",
                id: target_root.display().to_string(),
            });
        }
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| HatchError::Io {
            path: self.scratch_dir.clone(),
            source: e,
        })?;

        let archive_path = self
            .scratch_dir
            .join(format!("{}.{LAYER_ARCHIVE_EXTENSION}", blob.digest.hex()));
        let scratch = ScratchFile::write(archive_path, &blob.bytes)?;

        tracing::info!(
            digest = %blob.digest,
            archive = %scratch.path.display(),
            target = %target_root.display(),
            "extracting layer"
        );
        unpack_archive(&scratch.path, target_root)?;
        drop(scratch);

        Ok(AppliedLayer {
            digest: blob.digest.clone(),
            size_bytes: blob.bytes.len() as u64,
        })
    }
}

/// A scratch archive that is removed when dropped, whatever the outcome.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn write(path: PathBuf, bytes: &[u8]) -> Result<Self> {
        let scratch = Self { path };
        std::fs::write(&scratch.path, bytes).map_err(|e| HatchError::Io {
            path: scratch.path.clone(),
            source: e,
        })?;
        Ok(scratch)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(archive = %self.path.display(), "scratch archive removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(archive = %self.path.display(), error = %e, "failed to remove scratch archive");
            }
        }
    }
}

/// Unpacks a plain or gzip-compressed tar archive into `target`.
fn unpack_archive(archive_path: &Path, target: &Path) -> Result<()> {
    let io_err = |e: std::io::Error| HatchError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    };
    let mut file = File::open(archive_path).map_err(io_err)?;
    let mut magic = [0u8; 2];
    let is_gzip = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    let _ = file.seek(SeekFrom::Start(0)).map_err(io_err)?;

    if is_gzip {
        unpack_entries(tar::Archive::new(flate2::read::GzDecoder::new(file)), archive_path, target)
    } else {
        unpack_entries(tar::Archive::new(file), archive_path, target)
    }
}

fn unpack_entries<R: Read>(mut archive: tar::Archive<R>, archive_path: &Path, target: &Path) -> Result<()> {
    let extraction = |message: String| HatchError::Extraction {
        archive: archive_path.to_path_buf(),
        message,
    };

    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.set_unpack_xattrs(false);

    // Paths this layer has written so far, with their ancestors. An opaque
    // whiteout hides lower layers only, never its own layer's members.
    let mut unpacked: HashSet<PathBuf> = HashSet::new();

    let entries = archive.entries().map_err(|e| extraction(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction(e.to_string()))?;
        let member = entry
            .path()
            .map_err(|e| extraction(e.to_string()))?
            .into_owned();
        let relative = member_path(&member)?;

        if let Some(name) = relative.file_name().and_then(|n| n.to_str()) {
            if name.starts_with(WHITEOUT_PREFIX) {
                apply_whiteout(target, &relative, name, &unpacked)?;
                continue;
            }
        }

        let written = entry
            .unpack_in(target)
            .map_err(|e| extraction(format!("{}: {e}", member.display())))?;
        if !written {
            return Err(HatchError::UnsafeEntry { path: member });
        }
        for ancestor in relative.ancestors().take_while(|a| !a.as_os_str().is_empty()) {
            if !unpacked.insert(ancestor.to_path_buf()) {
                break;
            }
        }
    }
    Ok(())
}

/// Normalizes an archive member path to one relative to the target root.
///
/// Leading `/` and `.` components are dropped; `..` is rejected outright.
fn member_path(member: &Path) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(HatchError::UnsafeEntry {
                    path: member.to_path_buf(),
                });
            }
        }
    }
    Ok(relative)
}

/// Deletes what a whiteout marker hides. The marker itself is not created.
fn apply_whiteout(root: &Path, relative: &Path, name: &str, unpacked: &HashSet<PathBuf>) -> Result<()> {
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    let Some(dir) = resolve_without_symlinks(root, parent) else {
        return Ok(());
    };

    if name == OPAQUE_WHITEOUT {
        tracing::debug!(dir = %dir.display(), "opaque whiteout");
        return clear_lower_layers(&dir, parent, unpacked);
    }

    let hidden = &name[WHITEOUT_PREFIX.len()..];
    if hidden.is_empty() || hidden == "." || hidden == ".." {
        return Err(HatchError::UnsafeEntry {
            path: relative.to_path_buf(),
        });
    }
    tracing::debug!(path = %parent.join(hidden).display(), "whiteout");
    remove_path(&dir.join(hidden))
}

/// Empties `dir` of everything the current layer has not written itself.
///
/// Directories the layer wrote into are kept but cleared recursively, since
/// they may still hold lower-layer content.
fn clear_lower_layers(dir: &Path, relative: &Path, unpacked: &HashSet<PathBuf>) -> Result<()> {
    let children = match std::fs::read_dir(dir) {
        Ok(children) => children,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(HatchError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
        }
    };
    for child in children {
        let child = child.map_err(|e| HatchError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let child_relative = relative.join(child.file_name());
        if !unpacked.contains(&child_relative) {
            remove_path(&child.path())?;
        } else if child.file_type().is_ok_and(|t| t.is_dir()) {
            clear_lower_layers(&child.path(), &child_relative, unpacked)?;
        }
    }
    Ok(())
}

/// Joins `relative` onto `root`, refusing to walk through symlinks so that a
/// removal can never leave the root.
fn resolve_without_symlinks(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        let meta = std::fs::symlink_metadata(&current).ok()?;
        if !meta.is_dir() {
            return None;
        }
    }
    Some(current)
}

/// Removes a file, symlink, or directory tree; a missing path is fine.
fn remove_path(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(HatchError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| HatchError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
