//! CLI command definitions and dispatch.

pub mod pull;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hatch_common::config::{HatchConfig, RetryPolicy};
use hatch_common::constants::DEFAULT_REGISTRY_URL;

/// hatch: run one command in a throwaway root built from a registry image.
#[derive(Parser, Debug)]
#[command(name = "hatch", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Base URL of the image registry.
    #[arg(long, global = true, env = "HATCH_REGISTRY", default_value = DEFAULT_REGISTRY_URL)]
    pub registry: String,

    /// Directory in which sandbox roots are created (defaults to the system temp dir).
    #[arg(long, global = true, env = "HATCH_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Extra attempts for registry requests that fail transiently.
    #[arg(long, global = true, env = "HATCH_RETRIES", default_value_t = 0)]
    pub retries: u32,

    /// Skip checking downloaded layers against their digest.
    #[arg(long, global = true)]
    pub no_verify: bool,
}

impl Cli {
    /// Builds the launcher configuration from the global options.
    #[must_use]
    pub fn config(&self) -> HatchConfig {
        let defaults = HatchConfig::default();
        HatchConfig {
            registry_url: self.registry.clone(),
            work_dir: self.work_dir.clone().unwrap_or(defaults.work_dir),
            retry: RetryPolicy {
                max_retries: self.retries,
                ..defaults.retry
            },
            verify_digests: !self.no_verify,
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside an isolated root populated from an image.
    Run(run::RunArgs),
    /// Pull an image's layers into an existing directory.
    Pull(pull::PullArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// Returns the exit code the process should terminate with.
///
/// # Errors
///
/// Returns an error if the launcher itself fails; a failing sandboxed
/// command is reported through the exit code instead.
pub fn execute(cli: Cli) -> anyhow::Result<u8> {
    let config = cli.config();
    tracing::debug!(?config, "configuration resolved");
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Pull(args) => pull::execute(&args, config),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_keeps_command_flags_for_the_command() {
        let cli = Cli::try_parse_from(["hatch", "run", "alpine", "/bin/sh", "-c", "exit 3"]).expect("parse");
        let Command::Run(args) = cli.command else {
            unreachable!("expected run");
        };
        assert_eq!(args.image, "alpine");
        assert_eq!(args.command, PathBuf::from("/bin/sh"));
        assert_eq!(args.args, vec!["-c", "exit 3"]);
    }

    #[test]
    fn global_options_build_the_config() {
        let cli = Cli::try_parse_from([
            "hatch",
            "--registry",
            "http://localhost:5000",
            "--work-dir",
            "/var/tmp",
            "--retries",
            "2",
            "--no-verify",
            "pull",
            "busybox",
            "/srv/root",
        ])
        .expect("parse");
        let config = cli.config();
        assert_eq!(config.registry_url, "http://localhost:5000");
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp"));
        assert_eq!(config.retry.max_retries, 2);
        assert!(!config.verify_digests);
    }

    #[test]
    fn run_requires_image_and_command() {
        assert!(Cli::try_parse_from(["hatch", "run", "alpine"]).is_err());
        assert!(Cli::try_parse_from(["hatch"]).is_err());
    }
}
