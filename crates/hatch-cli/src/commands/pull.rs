//! `hatch pull`: materialize an image into a directory without running it.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use hatch_common::config::HatchConfig;
use hatch_common::types::ImageReference;
use hatch_runtime::engine::Launcher;

use crate::output::format_bytes;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Image reference (`name[:tag]`).
    pub image: String,

    /// Existing directory the layers are extracted into.
    pub dir: PathBuf,
}

/// Executes the `pull` command, listing each applied layer on stdout.
///
/// # Errors
///
/// Returns an error if the reference is invalid, the directory does not
/// exist, or the pull fails.
pub fn execute(args: &PullArgs, config: HatchConfig) -> anyhow::Result<u8> {
    let image = ImageReference::parse(&args.image)?;
    let applied = Launcher::new(config).pull(&image, &args.dir)?;

    let mut stdout = std::io::stdout().lock();
    for layer in &applied {
        writeln!(stdout, "{}\t{}", layer.digest, format_bytes(layer.size_bytes))?;
    }
    writeln!(
        stdout,
        "pulled {image} ({} layers) into {}",
        applied.len(),
        args.dir.display()
    )?;
    Ok(0)
}
