//! `hatch run`: run a command inside an isolated root.

use std::path::PathBuf;

use clap::Args;
use hatch_common::config::HatchConfig;
use hatch_common::types::ImageReference;
use hatch_runtime::engine::{LaunchRequest, Launcher};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference (`name[:tag]`), or `scratch` for an empty root.
    pub image: String,

    /// Executable to run: an absolute path, or a name looked up in `PATH`.
    pub command: PathBuf,

    /// Arguments passed to the command unchanged.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Executes the `run` command and returns the command's exit code.
///
/// # Errors
///
/// Returns an error if the image reference is invalid, or if pulling,
/// sandboxing, or spawning fails.
pub fn execute(args: RunArgs, config: HatchConfig) -> anyhow::Result<u8> {
    let image = ImageReference::parse(&args.image)?;
    let launcher = Launcher::new(config);
    if !launcher.is_available() {
        tracing::warn!("process isolation is not available on this platform");
    }

    let request = LaunchRequest {
        image: Some(image),
        command: args.command,
        args: args.args,
    };
    let result = launcher.launch(&request)?;
    if result.signaled {
        tracing::info!(exit_code = result.exit_code, "command was killed by a signal");
    }
    Ok(result.exit_code)
}
