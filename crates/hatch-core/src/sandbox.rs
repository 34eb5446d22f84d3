//! One-way sandbox state machine.
//!
//! A [`Sandbox`] starts [`SandboxState::Unsandboxed`] and moves to
//! [`SandboxState::Sandboxed`] exactly once. Entering applies, in order:
//!
//! 1. a new PID namespace, while no isolated child exists yet;
//! 2. the root change into the prepared directory.
//!
//! Neither step can be undone, so every host-side preparation must be
//! finished before [`Sandbox::enter`] is called.

use std::fmt;
use std::path::Path;

use hatch_common::error::{HatchError, Result};

use crate::isolation::Isolation;

/// Lifecycle state of the current process with respect to isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxState {
    /// The process still sees the host's root and process tree.
    Unsandboxed,
    /// The process has been confined; children are isolated.
    Sandboxed,
}

/// Drives an [`Isolation`] through the `Unsandboxed -> Sandboxed` transition.
pub struct Sandbox<I: Isolation> {
    isolation: I,
    state: SandboxState,
}

impl<I: Isolation> Sandbox<I> {
    /// Creates an unsandboxed state machine over `isolation`.
    pub const fn new(isolation: I) -> Self {
        Self {
            isolation,
            state: SandboxState::Unsandboxed,
        }
    }

    /// Returns the current state.
    pub const fn state(&self) -> SandboxState {
        self.state
    }

    /// Isolates the process tree, then confines the filesystem to `root`.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::AlreadySandboxed` on a second call, or the
    /// isolation error if either syscall fails. A failed attempt still
    /// leaves the machine `Sandboxed`: the namespace may already exist.
    pub fn enter(&mut self, root: &Path) -> Result<()> {
        if self.state == SandboxState::Sandboxed {
            return Err(HatchError::AlreadySandboxed);
        }
        self.state = SandboxState::Sandboxed;

        tracing::info!(root = %root.display(), "entering sandbox");
        self.isolation.isolate_process_tree()?;
        self.isolation.change_root(root)?;
        Ok(())
    }
}

impl<I: Isolation> fmt::Debug for Sandbox<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox").field("state", &self.state).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;

    /// Records calls instead of touching the process.
    #[derive(Default)]
    struct RecordingIsolation {
        calls: Mutex<Vec<String>>,
        fail_namespace: bool,
    }

    impl Isolation for RecordingIsolation {
        fn isolate_process_tree(&self) -> Result<()> {
            self.calls.lock().unwrap().push("pid-namespace".into());
            if self.fail_namespace {
                return Err(HatchError::PermissionDenied {
                    message: "EPERM".into(),
                });
            }
            Ok(())
        }

        fn change_root(&self, root: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("chroot:{}", root.display()));
            Ok(())
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn enter_creates_namespace_before_changing_root() {
        let iso = RecordingIsolation::default();
        let mut sandbox = Sandbox::new(&iso);
        assert_eq!(sandbox.state(), SandboxState::Unsandboxed);

        sandbox.enter(&PathBuf::from("/tmp/hatch-x")).expect("enter");

        assert_eq!(sandbox.state(), SandboxState::Sandboxed);
        assert_eq!(
            *iso.calls.lock().unwrap(),
            vec!["pid-namespace".to_string(), "chroot:/tmp/hatch-x".to_string()]
        );
    }

    #[test]
    fn second_enter_is_rejected() {
        let iso = RecordingIsolation::default();
        let mut sandbox = Sandbox::new(&iso);
        sandbox.enter(Path::new("/a")).expect("first enter");

        let err = sandbox.enter(Path::new("/b")).expect_err("re-entry");
        assert!(matches!(err, HatchError::AlreadySandboxed));
        assert_eq!(iso.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn failed_namespace_skips_root_change_and_poisons_state() {
        let iso = RecordingIsolation {
            fail_namespace: true,
            ..RecordingIsolation::default()
        };
        let mut sandbox = Sandbox::new(&iso);

        assert!(sandbox.enter(Path::new("/a")).is_err());
        assert_eq!(*iso.calls.lock().unwrap(), vec!["pid-namespace".to_string()]);
        assert_eq!(sandbox.state(), SandboxState::Sandboxed);
        assert!(matches!(
            sandbox.enter(Path::new("/a")),
            Err(HatchError::AlreadySandboxed)
        ));
    }
}
