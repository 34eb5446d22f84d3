//! PID namespace isolation.
//!
//! `unshare(CLONE_NEWPID)` does not move the caller into the new namespace.
//! It only decides where the caller's *next* child is born: that child
//! becomes PID 1 of the namespace and sees no process outside it. The
//! namespace must therefore be requested before the isolated command is
//! spawned, never after.

use hatch_common::error::{HatchError, Result};

/// Creates a new PID namespace for the children of the calling process.
///
/// After a successful call, the next `fork(2)` child will see
/// itself as PID 1 inside the new namespace.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWPID)` syscall fails,
/// typically because the caller lacks `CAP_SYS_ADMIN`.
#[cfg(target_os = "linux")]
pub fn create_pid_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWPID).map_err(|e| HatchError::PermissionDenied {
        message: format!("PID namespace creation failed: {e}"),
    })?;
    tracing::debug!("PID namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: PID namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_pid_namespace() -> Result<()> {
    Err(HatchError::Unsupported {
        message: "PID namespaces require Linux".into(),
    })
}
