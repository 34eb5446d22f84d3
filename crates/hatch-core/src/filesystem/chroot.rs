//! Root filesystem switching via `chroot(2)`.
//!
//! The sandbox is a plain directory, not a mount point, so `pivot_root(2)`
//! does not apply. After the switch the working directory is reset to the
//! new root so no path resolves through the old tree.

use std::path::Path;

use hatch_common::error::{HatchError, Result};

/// Changes the calling process's root to `new_root` and `chdir`s to `/`.
///
/// # Errors
///
/// Returns `HatchError::PermissionDenied` if `chroot(2)` fails (usually a
/// missing `CAP_SYS_CHROOT`) or if the working directory cannot be reset.
#[cfg(unix)]
pub fn change_root(new_root: &Path) -> Result<()> {
    tracing::info!(new_root = %new_root.display(), "changing root");
    nix::unistd::chroot(new_root).map_err(|e| HatchError::PermissionDenied {
        message: format!("chroot to {} failed: {e}", new_root.display()),
    })?;
    nix::unistd::chdir("/").map_err(|e| HatchError::PermissionDenied {
        message: format!("chdir to new root failed: {e}"),
    })?;
    Ok(())
}

/// Stub for non-Unix platforms.
///
/// # Errors
///
/// Always returns an error: `chroot` requires a Unix kernel.
#[cfg(not(unix))]
pub fn change_root(_new_root: &Path) -> Result<()> {
    Err(HatchError::Unsupported {
        message: "chroot requires a Unix kernel".into(),
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use nix::errno::Errno;

    use super::*;

    #[test]
    fn change_root_without_privilege_is_permission_denied() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.args(["-c", "true"]);
        // SAFETY: the hook only issues syscalls and converts their result.
        unsafe {
            let _ = cmd.pre_exec(move || {
                change_root(&root).map_err(|e| std::io::Error::other(e.to_string()))
            });
        }
        assert!(cmd.status().is_err());
    }

    #[test]
    fn host_files_are_invisible_after_change_root() {
        if !nix::unistd::geteuid().is_root() {
            eprintln!("skipping: requires root");
            return;
        }
        let host = tempfile::tempdir().expect("host tempdir");
        let marker = host.path().join("host-only-marker");
        std::fs::write(&marker, b"host").expect("write marker");

        let sandbox = tempfile::tempdir().expect("sandbox tempdir");
        let root = sandbox.path().to_path_buf();
        let marker_in_child = marker.clone();

        let mut cmd = Command::new("/bin/sh");
        let _ = cmd.args(["-c", "true"]);
        // The probe runs in the forked child after the root change and always
        // aborts the exec; the errno it reports tells the parent what it saw.
        // SAFETY: the hook only issues syscalls and converts their result.
        unsafe {
            let _ = cmd.pre_exec(move || {
                change_root(&root).map_err(|e| std::io::Error::other(e.to_string()))?;
                if marker_in_child.exists() {
                    return Err(Errno::EEXIST.into());
                }
                Err(Errno::ENOENT.into())
            });
        }
        let err = cmd.status().expect_err("probe always aborts the exec");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
