//! # hatch-image
//!
//! Container image retrieval for the hatch launcher.
//!
//! Handles:
//! - **Registry**: the v2 pull protocol (challenge, token, manifest, blobs).
//! - **Challenge**: a `nom` grammar for `WWW-Authenticate` headers.
//! - **Manifest**: schema 1 and schema 2 layer lists, order preserved.
//! - **Layers**: ordered extraction of blobs into a root, with whiteouts.
//! - **Hashing**: SHA-256 verification of downloaded blobs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod challenge;
pub mod hash;
pub mod layer;
pub mod manifest;
pub mod pull;
pub mod registry;
pub mod transport;
