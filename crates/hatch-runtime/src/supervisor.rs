//! Running the sandboxed command and relaying its outcome.
//!
//! The command runs in its own session with stdin inherited and both output
//! streams captured. Once it terminates, the captured bytes are written to
//! the supervisor's writers unchanged and the exit status is normalized into
//! a [`LaunchResult`].

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use hatch_common::constants::LAUNCHER_FAILURE_EXIT;
use hatch_common::error::{HatchError, Result};
use hatch_common::types::LaunchResult;

/// Spawns one command, waits for it, and relays its output.
#[derive(Debug)]
pub struct ProcessSupervisor<O: Write, E: Write> {
    stdout: O,
    stderr: E,
}

impl ProcessSupervisor<io::Stdout, io::Stderr> {
    /// Creates a supervisor relaying to this process's own stdout and stderr.
    #[must_use]
    pub fn inherit() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> ProcessSupervisor<O, E> {
    /// Creates a supervisor relaying to the given writers.
    pub const fn new(stdout: O, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    /// Runs `command` with `args` to completion.
    ///
    /// A non-zero exit of the command is not an error; it is reported in the
    /// returned [`LaunchResult`].
    ///
    /// # Errors
    ///
    /// Returns `HatchError::Spawn` if the command cannot be started or
    /// waited for.
    pub fn run(&mut self, command: &Path, args: &[String]) -> Result<LaunchResult> {
        let spawn_error = |e: io::Error| HatchError::Spawn {
            command: command.display().to_string(),
            source: e,
        };

        let mut cmd = Command::new(command);
        let _ = cmd
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        new_session(&mut cmd);

        tracing::info!(command = %command.display(), args = ?args, "spawning command");
        let child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id();
        let output = child.wait_with_output().map_err(spawn_error)?;

        let result = launch_result(output.status);
        tracing::info!(
            pid,
            exit_code = result.exit_code,
            signaled = result.signaled,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "command finished"
        );

        relay(&mut self.stdout, &output.stdout, "stdout");
        relay(&mut self.stderr, &output.stderr, "stderr");
        Ok(result)
    }

    /// Returns the writers, consuming the supervisor.
    pub fn into_writers(self) -> (O, E) {
        (self.stdout, self.stderr)
    }
}

/// Writes captured bytes; a closed reader must not mask the exit code.
fn relay(writer: &mut impl Write, bytes: &[u8], stream: &'static str) {
    if let Err(e) = writer.write_all(bytes).and_then(|()| writer.flush()) {
        tracing::warn!(stream, error = %e, "failed to relay command output");
    }
}

#[cfg(unix)]
fn new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: the closure runs between fork and exec and only calls
    // setsid(2), which is async-signal-safe and allocates nothing.
    unsafe {
        let _ = cmd.pre_exec(|| nix::unistd::setsid().map(drop).map_err(io::Error::from));
    }
}

#[cfg(not(unix))]
const fn new_session(_cmd: &mut Command) {}

/// Maps exit `N` to `N` and death by signal `S` to `128 + S`.
fn launch_result(status: ExitStatus) -> LaunchResult {
    if let Some(code) = status.code() {
        return LaunchResult::exited(u8::try_from(code).unwrap_or(LAUNCHER_FAILURE_EXIT));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return LaunchResult::killed(u8::try_from(signal).unwrap_or(u8::MAX));
        }
    }
    LaunchResult::exited(LAUNCHER_FAILURE_EXIT)
}
