//! Sandbox root preparation and teardown.
//!
//! A [`SandboxBuilder`] stages everything the sandboxed command needs on the
//! host side: a fresh `hatch-<uuid>` directory, a copy of the executable at
//! the path the caller named it by (relative to that directory), and
//! optionally the layers of an image. The resulting [`SandboxRoot`] is entered once and removed when
//! dropped, whether or not the process has changed its root in between.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use hatch_common::config::HatchConfig;
use hatch_common::constants::{SANDBOX_PREFIX, SCRATCH_SUFFIX};
use hatch_common::error::{HatchError, Result};
use hatch_common::types::{ImageReference, SandboxId};
use hatch_core::isolation::{Isolation, process_sandboxed};
use hatch_core::sandbox::Sandbox;
use hatch_image::layer::{AppliedLayer, LayerMaterializer};
use hatch_image::pull::pull_image;
use hatch_image::registry::RegistryClient;
use hatch_image::transport::{HttpTransport, Transport};

/// Prepares sandbox roots under a work directory.
#[derive(Debug)]
pub struct SandboxBuilder<T: Transport = HttpTransport> {
    work_dir: PathBuf,
    registry: RegistryClient<T>,
}

impl SandboxBuilder<HttpTransport> {
    /// Creates a builder that pulls images over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &HatchConfig) -> Result<Self> {
        Ok(Self::new(RegistryClient::from_config(config)?, &config.work_dir))
    }
}

impl<T: Transport> SandboxBuilder<T> {
    /// Creates a builder over an existing registry client.
    pub fn new(registry: RegistryClient<T>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            registry,
        }
    }

    /// Returns the directory sandbox roots are created in.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Stages `executable` and, unless `image` is absent or `scratch`, the
    /// image's layers in a new sandbox root.
    ///
    /// The executable is resolved before anything touches the disk or the
    /// network. A failure at any later step removes the partial root.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::AlreadySandboxed` if this process has already
    /// changed its root, `HatchError::NotFound` if the executable does not
    /// exist on the host or is missing from the populated tree,
    /// `HatchError::InvalidExecutable` if its path contains `..`, and any
    /// registry or extraction error from the pull.
    pub fn prepare(&self, executable: &Path, image: Option<&ImageReference>) -> Result<SandboxRoot> {
        if process_sandboxed() {
            return Err(HatchError::AlreadySandboxed);
        }
        let host_executable = resolve_executable(executable)?;
        let relative = staging_path(executable, &host_executable)?;

        let mut root = SandboxRoot::create(&self.work_dir)?;
        tracing::info!(
            id = %root.id,
            root = %root.path.display(),
            executable = %host_executable.display(),
            "preparing sandbox"
        );

        stage_executable(&host_executable, &root.path.join(&relative))?;

        if let Some(image) = image.filter(|i| !i.is_scratch()) {
            let _ = self.populate(&root, image)?;
        }

        let staged = root.path.join(&relative);
        if staged.symlink_metadata().is_err() {
            return Err(HatchError::NotFound {
                kind: "executable in sandbox",
                id: Path::new("/").join(&relative).display().to_string(),
            });
        }

        root.command_path = Path::new("/").join(relative);
        Ok(root)
    }

    fn populate(&self, root: &SandboxRoot, image: &ImageReference) -> Result<Vec<AppliedLayer>> {
        let materializer = LayerMaterializer::new(root.scratch_path());
        let result = pull_image(&self.registry, &materializer, image, &root.path);
        remove_tree(materializer.scratch_dir());
        result
    }
}

/// A staged sandbox directory, removed when dropped.
#[derive(Debug)]
pub struct SandboxRoot {
    id: SandboxId,
    path: PathBuf,
    command_path: PathBuf,
    anchor: Option<File>,
}

impl SandboxRoot {
    fn create(work_dir: &Path) -> Result<Self> {
        let id = SandboxId::generate();
        let path = work_dir.join(format!("{SANDBOX_PREFIX}{id}"));
        std::fs::create_dir(&path).map_err(|e| HatchError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self {
            id,
            path,
            command_path: PathBuf::new(),
            anchor: None,
        })
    }

    /// Returns the sandbox identifier.
    #[must_use]
    pub const fn id(&self) -> &SandboxId {
        &self.id
    }

    /// Returns the host path of the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the command path as seen from inside the sandbox.
    #[must_use]
    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    /// Confines the process to this root through `sandbox`.
    ///
    /// The parent directory is opened first so that [`Drop`] can still reach
    /// the root after the process's view of `/` has changed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the parent directory cannot be opened, or the
    /// error from [`Sandbox::enter`].
    pub fn enter<I: Isolation>(&mut self, sandbox: &mut Sandbox<I>) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("/"));
        let anchor = File::open(parent).map_err(|e| HatchError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
        self.anchor = Some(anchor);
        sandbox.enter(&self.path)
    }

    fn scratch_path(&self) -> PathBuf {
        let mut name = self.dir_name();
        name.push(SCRATCH_SUFFIX);
        self.path.with_file_name(name)
    }

    fn dir_name(&self) -> std::ffi::OsString {
        self.path.file_name().map(ToOwned::to_owned).unwrap_or_default()
    }
}

impl Drop for SandboxRoot {
    fn drop(&mut self) {
        // Still visible at its host path unless the root has changed.
        if self.path.is_dir() || self.anchor.is_none() {
            remove_tree(&self.path);
            remove_tree(&self.scratch_path());
            return;
        }
        let Some(anchor) = self.anchor.take() else {
            return;
        };
        if let Err(e) = nix::unistd::fchdir(&anchor) {
            tracing::warn!(root = %self.path.display(), error = %e, "cannot return to sandbox parent; leaving root behind");
            return;
        }
        remove_tree(Path::new(&self.dir_name()));
        let mut scratch = self.dir_name();
        scratch.push(SCRATCH_SUFFIX);
        remove_tree(Path::new(&scratch));
    }
}

/// Removes `path` recursively, logging anything but absence.
fn remove_tree(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove sandbox directory"),
    }
}

fn is_bare_name(executable: &Path) -> bool {
    executable.components().count() == 1
        && matches!(executable.components().next(), Some(Component::Normal(_)))
}

/// Finds `executable` on the host: bare names through `PATH`, anything
/// else relative to the current directory.
fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    let not_found = || HatchError::NotFound {
        kind: "executable",
        id: executable.display().to_string(),
    };

    let found = if is_bare_name(executable) {
        which::which(executable).map_err(|_| not_found())?
    } else {
        executable.to_path_buf()
    };
    if !found.is_file() {
        return Err(not_found());
    }

    let absolute = std::path::absolute(&found).map_err(|e| HatchError::Io {
        path: found.clone(),
        source: e,
    })?;
    if absolute.components().any(|c| c == Component::ParentDir) {
        return std::fs::canonicalize(&absolute).map_err(|e| HatchError::Io {
            path: absolute,
            source: e,
        });
    }
    Ok(absolute)
}

/// Where the executable lives inside the root, relative to it.
///
/// Bare names keep the location `PATH` resolved them to. Any other path is
/// staged exactly as the caller wrote it, so `bin/tool` lands at
/// `<root>/bin/tool` and `/usr/bin/env` at `<root>/usr/bin/env`.
fn staging_path(executable: &Path, host_executable: &Path) -> Result<PathBuf> {
    let named = if is_bare_name(executable) {
        host_executable
    } else {
        executable
    };
    if named.components().any(|c| c == Component::ParentDir) {
        return Err(HatchError::InvalidExecutable {
            path: executable.to_path_buf(),
            reason: "`..` components cannot be reproduced inside the sandbox",
        });
    }
    Ok(relative_to_root(named))
}

/// Strips the root component, so `/usr/bin/env` becomes `usr/bin/env`.
fn relative_to_root(absolute: &Path) -> PathBuf {
    absolute
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn stage_executable(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HatchError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let _ = std::fs::copy(source, destination).map_err(|e| HatchError::Io {
        path: destination.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(from = %source.display(), to = %destination.display(), "executable staged");
    Ok(())
}
