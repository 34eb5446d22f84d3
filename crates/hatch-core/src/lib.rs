//! # hatch-core
//!
//! Low-level Linux isolation primitives for the hatch launcher.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: PID namespace creation via `unshare(2)`.
//! - **Filesystem**: `chroot(2)` into a prepared sandbox root.
//! - **Isolation**: the [`isolation::Isolation`] capability, with a native
//!   Linux implementation and an explicit "unsupported" fallback.
//! - **Sandbox**: the one-way `Unsandboxed -> Sandboxed` state machine.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod isolation;
pub mod namespace;
pub mod sandbox;
