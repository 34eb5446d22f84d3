//! Filesystem confinement for the sandboxed process.

pub mod chroot;
