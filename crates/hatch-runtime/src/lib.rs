//! Sandbox preparation, process supervision, and launch orchestration.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod sandbox;
pub mod supervisor;
