//! Linux namespace management for process isolation.
//!
//! Only the PID namespace is created; network, mount, IPC, UTS and user
//! namespaces are left shared with the host.

pub mod pid;
