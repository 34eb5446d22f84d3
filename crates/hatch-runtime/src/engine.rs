//! Launch orchestration.
//!
//! [`Launcher::launch`] runs the whole single-shot pipeline: prepare the
//! sandbox root, isolate the process, run the command, clean up. The
//! sandbox root is dropped on every path out of the pipeline, so cleanup
//! also happens when a step fails.

use std::fmt;
use std::path::{Path, PathBuf};

use hatch_common::config::HatchConfig;
use hatch_common::constants::{SANDBOX_PREFIX, SCRATCH_SUFFIX};
use hatch_common::error::{HatchError, Result};
use hatch_common::types::{ImageReference, LaunchResult, SandboxId};
use hatch_core::isolation::{self, Isolation};
use hatch_core::sandbox::Sandbox;
use hatch_image::layer::{AppliedLayer, LayerMaterializer};
use hatch_image::registry::RegistryClient;
use hatch_image::transport::Transport;

use crate::sandbox::SandboxBuilder;
use crate::supervisor::ProcessSupervisor;

/// What to run, and on top of which image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Image whose layers populate the root; `None` or `scratch` for none.
    pub image: Option<ImageReference>,
    /// Executable path on the host, or a bare name looked up in `PATH`.
    pub command: PathBuf,
    /// Arguments passed to the command.
    pub args: Vec<String>,
}

/// Coordinates registry, sandbox, and supervisor for one invocation.
pub struct Launcher {
    config: HatchConfig,
    isolation: Box<dyn Isolation>,
}

impl Launcher {
    /// Creates a launcher with the platform's isolation implementation.
    #[must_use]
    pub fn new(config: HatchConfig) -> Self {
        Self::with_isolation(config, isolation::detect_isolation())
    }

    /// Creates a launcher over a specific isolation implementation.
    #[must_use]
    pub fn with_isolation(config: HatchConfig, isolation: Box<dyn Isolation>) -> Self {
        Self { config, isolation }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &HatchConfig {
        &self.config
    }

    /// Returns whether the isolation implementation can confine processes.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.isolation.is_available()
    }

    /// Runs `request` in a fresh sandbox, pulling over HTTP, and relays its
    /// output to this process's stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns any launcher-side failure. The command's own exit status,
    /// zero or not, is reported in the [`LaunchResult`].
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchResult> {
        let builder = SandboxBuilder::from_config(&self.config)?;
        self.launch_with(&builder, &mut ProcessSupervisor::inherit(), request)
    }

    /// Runs `request` with an explicit builder and supervisor.
    ///
    /// # Errors
    ///
    /// Same as [`Launcher::launch`].
    pub fn launch_with<T, O, E>(
        &self,
        builder: &SandboxBuilder<T>,
        supervisor: &mut ProcessSupervisor<O, E>,
        request: &LaunchRequest,
    ) -> Result<LaunchResult>
    where
        T: Transport,
        O: std::io::Write,
        E: std::io::Write,
    {
        let mut root = builder.prepare(&request.command, request.image.as_ref())?;
        let mut sandbox = Sandbox::new(self.isolation.as_ref());
        root.enter(&mut sandbox)?;

        let result = supervisor.run(root.command_path(), &request.args);
        drop(root);
        result
    }

    /// Pulls `image` into the existing directory `target_dir` without
    /// running anything.
    ///
    /// # Errors
    ///
    /// Returns registry and extraction errors, or `HatchError::NotFound` if
    /// `target_dir` does not exist.
    pub fn pull(&self, image: &ImageReference, target_dir: &Path) -> Result<Vec<AppliedLayer>> {
        let client = RegistryClient::from_config(&self.config)?;
        self.pull_with(&client, image, target_dir)
    }

    /// Pulls `image` through an explicit registry client.
    ///
    /// # Errors
    ///
    /// Same as [`Launcher::pull`].
    pub fn pull_with<T: Transport>(
        &self,
        client: &RegistryClient<T>,
        image: &ImageReference,
        target_dir: &Path,
    ) -> Result<Vec<AppliedLayer>> {
        if !target_dir.is_dir() {
            return Err(HatchError::NotFound {
                kind: "target directory",
                id: target_dir.display().to_string(),
            });
        }
        if image.is_scratch() {
            tracing::info!(target = %target_dir.display(), "scratch image has no layers");
            return Ok(Vec::new());
        }

        let scratch_dir = self
            .config
            .work_dir
            .join(format!("{SANDBOX_PREFIX}{}{SCRATCH_SUFFIX}", SandboxId::generate()));
        let materializer = LayerMaterializer::new(&scratch_dir);
        let result = hatch_image::pull::pull_image(client, &materializer, image, target_dir);
        match std::fs::remove_dir_all(&scratch_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %scratch_dir.display(), error = %e, "failed to remove scratch directory"),
        }
        result
    }
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("config", &self.config)
            .field("isolation_available", &self.isolation.is_available())
            .finish()
    }
}
