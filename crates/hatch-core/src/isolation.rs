//! The process-isolation capability.
//!
//! [`Isolation`] names the two irreversible operations a sandbox needs.
//! [`NativeIsolation`] performs them with real syscalls on Linux;
//! [`UnsupportedIsolation`] refuses them explicitly so that platforms
//! without PID namespaces fail loudly instead of running unisolated.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use hatch_common::error::{HatchError, Result};

/// Irreversible, process-wide isolation operations.
pub trait Isolation: Send + Sync {
    /// Arranges for the next spawned child to start in a fresh PID namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be created.
    fn isolate_process_tree(&self) -> Result<()>;

    /// Confines the calling process's filesystem view to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be changed.
    fn change_root(&self, root: &Path) -> Result<()>;

    /// Returns whether this implementation can actually isolate.
    fn is_available(&self) -> bool;
}

impl<T: Isolation + ?Sized> Isolation for &T {
    fn isolate_process_tree(&self) -> Result<()> {
        (**self).isolate_process_tree()
    }

    fn change_root(&self, root: &Path) -> Result<()> {
        (**self).change_root(root)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Set once the real syscalls have run in this process.
static PROCESS_SANDBOXED: AtomicBool = AtomicBool::new(false);

/// Returns whether [`NativeIsolation`] has already confined this process.
pub fn process_sandboxed() -> bool {
    PROCESS_SANDBOXED.load(Ordering::SeqCst)
}

/// Isolation through Linux PID namespaces and `chroot(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeIsolation;

impl Isolation for NativeIsolation {
    fn isolate_process_tree(&self) -> Result<()> {
        if process_sandboxed() {
            return Err(HatchError::AlreadySandboxed);
        }
        crate::namespace::pid::create_pid_namespace()
    }

    fn change_root(&self, root: &Path) -> Result<()> {
        // Claimed before the syscall: a failed attempt still counts, since
        // the PID namespace already exists by the time the root changes.
        if PROCESS_SANDBOXED.swap(true, Ordering::SeqCst) {
            return Err(HatchError::AlreadySandboxed);
        }
        crate::filesystem::chroot::change_root(root)
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

/// Isolation for platforms without PID namespaces: every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedIsolation;

impl Isolation for UnsupportedIsolation {
    fn isolate_process_tree(&self) -> Result<()> {
        Err(HatchError::Unsupported {
            message: "process-tree isolation requires Linux PID namespaces".into(),
        })
    }

    fn change_root(&self, _root: &Path) -> Result<()> {
        Err(HatchError::Unsupported {
            message: "root change is not available on this platform".into(),
        })
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Auto-detect the isolation implementation for the current platform.
#[must_use]
pub fn detect_isolation() -> Box<dyn Isolation> {
    #[cfg(target_os = "linux")]
    {
        Box::new(NativeIsolation)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedIsolation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_isolation_refuses_everything() {
        let iso = UnsupportedIsolation;
        assert!(!iso.is_available());
        assert!(matches!(
            iso.isolate_process_tree(),
            Err(HatchError::Unsupported { .. })
        ));
        assert!(matches!(
            iso.change_root(Path::new("/tmp")),
            Err(HatchError::Unsupported { .. })
        ));
    }

    #[test]
    fn detected_isolation_matches_platform() {
        let iso = detect_isolation();
        assert_eq!(iso.is_available(), cfg!(target_os = "linux"));
    }

    #[test]
    fn fresh_test_process_is_not_sandboxed() {
        assert!(!process_sandboxed());
    }
}
