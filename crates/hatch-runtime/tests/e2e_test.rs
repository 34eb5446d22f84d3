//! End-to-end tests of the preparation pipeline against an in-memory registry.
//!
//! These tests cover everything that happens before the process isolates
//! itself and therefore need neither root nor network:
//! 1. Challenge, token exchange, and authenticated manifest fetch
//! 2. Layer download, digest verification, and ordered extraction
//! 3. Executable staging and whiteout handling
//! 4. Cleanup of sandbox roots and scratch archives on success and failure

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use hatch_common::config::HatchConfig;
use hatch_common::error::{HatchError, Result};
use hatch_common::types::ImageReference;
use hatch_image::hash::sha256_hex;
use hatch_image::registry::RegistryClient;
use hatch_image::transport::{HttpRequest, HttpResponse, Transport};
use hatch_runtime::sandbox::SandboxBuilder;

const REGISTRY: &str = "https://registry.test";
const REALM: &str = "https://auth.test/token";
const TOKEN: &str = "pull-token";
const AUTHORIZATION: &str = "Bearer pull-token";

/// A single-repository registry that insists on bearer authentication.
struct FakeRegistry {
    manifest: String,
    content_type: &'static str,
    blobs: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeRegistry {
    fn with_layers(layers: &[Vec<u8>]) -> Self {
        let digests: Vec<String> = layers.iter().map(|l| format!("sha256:{}", sha256_hex(l))).collect();
        let descriptors: Vec<String> = digests
            .iter()
            .zip(layers)
            .map(|(d, l)| format!(r#"{{"mediaType":"application/vnd.docker.image.rootfs.diff.tar.gzip","size":{},"digest":"{d}"}}"#, l.len()))
            .collect();
        let manifest = format!(
            r#"{{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json","layers":[{}]}}"#,
            descriptors.join(",")
        );
        Self {
            manifest,
            content_type: "application/vnd.docker.distribution.manifest.v2+json",
            blobs: digests.into_iter().zip(layers.iter().cloned()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests_to(&self, prefix: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn respond(status: u16, body: impl Into<Vec<u8>>) -> HttpResponse {
        HttpResponse {
            status,
            body: body.into(),
            ..HttpResponse::default()
        }
    }
}

impl Transport for FakeRegistry {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if request.url == REALM {
            return Ok(Self::respond(200, format!(r#"{{"token":"{TOKEN}"}}"#)));
        }
        if request.header_value("Authorization") != Some(AUTHORIZATION) {
            return Ok(HttpResponse {
                www_authenticate: Some(format!(
                    r#"Bearer realm="{REALM}",service="registry.test",scope="repository:library/demo:pull""#
                )),
                ..Self::respond(401, "")
            });
        }
        if request.url == format!("{REGISTRY}/v2/library/demo/manifests/latest") {
            return Ok(HttpResponse {
                content_type: Some(self.content_type.to_string()),
                ..Self::respond(200, self.manifest.clone())
            });
        }
        let blob = request
            .url
            .strip_prefix(&format!("{REGISTRY}/v2/library/demo/blobs/"))
            .and_then(|digest| self.blobs.get(digest));
        Ok(blob.map_or_else(|| Self::respond(404, ""), |b| Self::respond(200, b.clone())))
    }
}

/// Builds an uncompressed layer from `(path, contents, mode)` entries.
fn layer(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn config(work_dir: &Path) -> HatchConfig {
    HatchConfig {
        registry_url: REGISTRY.to_string(),
        work_dir: work_dir.to_path_buf(),
        ..HatchConfig::default()
    }
}

fn host_executable(dir: &Path) -> PathBuf {
    let path = dir.join("tool");
    std::fs::write(&path, b"#!/bin/sh\necho host\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn relative(path: &Path) -> PathBuf {
    path.strip_prefix("/").unwrap().to_path_buf()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn pipeline_applies_layers_in_manifest_order() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());

    let base = layer(&[
        ("etc/motd", b"base\n", 0o644),
        ("etc/gone", b"soon removed\n", 0o644),
        ("bin/busybox", b"\x7fELF", 0o755),
    ]);
    let top = gzip(&layer(&[("etc/motd", b"top\n", 0o644), ("etc/.wh.gone", b"", 0o644)]));
    let registry = FakeRegistry::with_layers(&[base, top]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());
    let image = ImageReference::parse("demo").unwrap();

    let root = builder.prepare(&exe, Some(&image)).expect("prepare");

    assert_eq!(std::fs::read(root.path().join("etc/motd")).unwrap(), b"top\n");
    assert!(!root.path().join("etc/gone").exists());
    let mode = std::fs::metadata(root.path().join("bin/busybox")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    assert_eq!(
        std::fs::read(root.path().join(relative(&exe))).unwrap(),
        b"#!/bin/sh\necho host\n"
    );
    assert_eq!(root.command_path(), exe.as_path());

    // Only the root itself remains; the scratch archives are gone.
    let name = root.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(entries(work.path()), vec![name]);
}

#[test]
fn pipeline_requests_exactly_one_pull_scoped_token() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let registry = FakeRegistry::with_layers(&[layer(&[("a", b"1", 0o644)]), layer(&[("b", b"2", 0o644)])]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let _root = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect("prepare");

    let token_requests = registry.requests_to(REALM);
    assert_eq!(token_requests.len(), 1);
    assert_eq!(
        token_requests[0].query_value("scope"),
        Some("repository:library/demo:pull")
    );
    assert_eq!(token_requests[0].query_value("service"), Some("registry.test"));

    let blob_requests = registry.requests_to(&format!("{REGISTRY}/v2/library/demo/blobs/"));
    assert_eq!(blob_requests.len(), 2);
    assert!(
        blob_requests
            .iter()
            .all(|r| r.header_value("Authorization") == Some(AUTHORIZATION))
    );
}

#[test]
fn a_layer_may_replace_the_staged_executable() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let member = relative(&exe).to_string_lossy().into_owned();
    let registry = FakeRegistry::with_layers(&[layer(&[(member.as_str(), b"#!/bin/sh\necho image\n", 0o755)])]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let root = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect("prepare");

    assert_eq!(
        std::fs::read(root.path().join(relative(&exe))).unwrap(),
        b"#!/bin/sh\necho image\n"
    );
}

#[test]
fn whiteout_of_the_executable_is_an_input_error() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let parent = relative(exe.parent().unwrap());
    let whiteout = parent.join(".wh.tool").to_string_lossy().into_owned();
    let registry = FakeRegistry::with_layers(&[layer(&[(whiteout.as_str(), b"", 0o644)])]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let err = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect_err("executable removed");

    assert!(matches!(err, HatchError::NotFound { .. }));
    assert!(entries(work.path()).is_empty());
}

#[test]
fn corrupted_blob_aborts_and_cleans_up() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let mut registry = FakeRegistry::with_layers(&[layer(&[("a", b"1", 0o644)])]);
    for blob in registry.blobs.values_mut() {
        blob.push(0);
    }
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let err = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect_err("hash mismatch");

    assert!(matches!(err, HatchError::HashMismatch { .. }));
    assert!(entries(work.path()).is_empty());
}

#[test]
fn manifest_list_is_unsupported_and_cleans_up() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let mut registry = FakeRegistry::with_layers(&[]);
    registry.manifest = r#"{"schemaVersion":2,"manifests":[{"digest":"sha256:00"}]}"#.to_string();
    registry.content_type = "application/vnd.docker.distribution.manifest.list.v2+json";
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let err = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect_err("list");

    assert!(matches!(err, HatchError::UnsupportedManifest { .. }));
    assert!(entries(work.path()).is_empty());
}

#[test]
fn unknown_tag_is_a_registry_error() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let registry = FakeRegistry::with_layers(&[layer(&[("a", b"1", 0o644)])]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let err = builder
        .prepare(&exe, Some(&ImageReference::parse("demo:missing").unwrap()))
        .expect_err("unknown tag");

    assert_eq!(err.kind(), hatch_common::error::ErrorKind::Registry);
    assert!(entries(work.path()).is_empty());
}

#[test]
fn dropping_the_root_removes_everything() {
    let host = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let exe = host_executable(host.path());
    let registry = FakeRegistry::with_layers(&[layer(&[("etc/motd", b"hi\n", 0o644)])]);
    let builder = SandboxBuilder::new(RegistryClient::new(&registry, &config(work.path())), work.path());

    let root = builder
        .prepare(&exe, Some(&ImageReference::parse("demo").unwrap()))
        .expect("prepare");
    drop(root);

    assert!(entries(work.path()).is_empty());
}
