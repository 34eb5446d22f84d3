//! Registry pull protocol client.
//!
//! Speaks the Docker Registry HTTP API v2 pull flow:
//!
//! 1. anonymous `GET /v2/<repo>/manifests/<tag>`;
//! 2. on 401, parse the `WWW-Authenticate` challenge and exchange it at the
//!    realm for a bearer token scoped to `repository:<repo>:pull`;
//! 3. repeat the manifest request with `Authorization: Bearer <token>`;
//! 4. `GET /v2/<repo>/blobs/<digest>` for every layer, reusing the token.
//!
//! Nothing is cached between invocations.

use std::fmt;

use hatch_common::config::{HatchConfig, RetryPolicy};
use hatch_common::constants::MANIFEST_MEDIA_TYPES;
use hatch_common::error::{HatchError, Result};
use hatch_common::types::{ImageReference, LayerDigest};
use serde::Deserialize;

use crate::challenge::AuthChallenge;
use crate::manifest::Manifest;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

/// Short-lived credential for one pull. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the `Authorization` header value for this token.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// One downloaded layer archive.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Digest the blob was requested by.
    pub digest: LayerDigest,
    /// Raw archive bytes.
    pub bytes: Vec<u8>,
}

/// Outcome of [`RegistryClient::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The image's layer list.
    pub manifest: Manifest,
    /// Token to reuse for blob fetches; `None` if the registry is open.
    pub token: Option<BearerToken>,
}

/// Body of a token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Client for one registry.
pub struct RegistryClient<T: Transport = HttpTransport> {
    transport: T,
    registry_url: String,
    retry: RetryPolicy,
    verify_digests: bool,
}

impl RegistryClient<HttpTransport> {
    /// Creates a client using a `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &HatchConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new()?, config))
    }
}

impl<T: Transport> RegistryClient<T> {
    /// Creates a client over an arbitrary transport.
    pub fn new(transport: T, config: &HatchConfig) -> Self {
        Self {
            transport,
            registry_url: config.registry_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            verify_digests: config.verify_digests,
        }
    }

    /// Fetches the manifest for `image`, authenticating if challenged.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::UnexpectedStatus` for any status other than
    /// 200/401 on the first request or other than 200 on the authenticated
    /// one, `HatchError::InvalidChallenge` if a 401 carries no usable
    /// challenge, `HatchError::MissingToken` if the token service returns
    /// none, and manifest parsing errors.
    pub fn resolve(&self, image: &ImageReference) -> Result<Resolved> {
        let url = self.manifest_url(image);
        tracing::info!(image = %image, url = %url, "resolving manifest");

        let anonymous = self.send(&manifest_request(&url))?;
        let (response, token) = match anonymous.status {
            200 => (anonymous, None),
            401 => {
                let header = anonymous.www_authenticate.as_deref().ok_or_else(|| {
                    HatchError::InvalidChallenge {
                        message: format!("401 from {url} without WWW-Authenticate"),
                    }
                })?;
                let challenge = AuthChallenge::parse(header)?;
                let token = self.request_token(&challenge, image)?;
                let request = manifest_request(&url).header("Authorization", token.authorization());
                let response = self.send(&request)?;
                if response.status != 200 {
                    return Err(HatchError::UnexpectedStatus {
                        url,
                        status: response.status,
                    });
                }
                (response, Some(token))
            }
            status => return Err(HatchError::UnexpectedStatus { url, status }),
        };

        let manifest = Manifest::parse(&response.body, response.content_type.as_deref())?;
        tracing::info!(image = %image, layers = manifest.layers().len(), "manifest resolved");
        Ok(Resolved { manifest, token })
    }

    /// Downloads one blob of `image`.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::UnexpectedStatus` on any non-200 answer and
    /// `HatchError::HashMismatch` if digest verification is on and fails.
    pub fn fetch(
        &self,
        image: &ImageReference,
        digest: &LayerDigest,
        token: Option<&BearerToken>,
    ) -> Result<Blob> {
        let url = format!("{}/v2/{}/blobs/{digest}", self.registry_url, image.repository());
        let mut request = HttpRequest::get(&url);
        if let Some(token) = token {
            request = request.header("Authorization", token.authorization());
        }

        tracing::info!(digest = %digest, "fetching layer");
        let response = self.send(&request)?;
        if response.status != 200 {
            return Err(HatchError::UnexpectedStatus {
                url,
                status: response.status,
            });
        }
        if self.verify_digests {
            crate::hash::verify_digest(digest, &response.body)?;
        }
        tracing::debug!(digest = %digest, bytes = response.body.len(), "layer fetched");
        Ok(Blob {
            digest: digest.clone(),
            bytes: response.body,
        })
    }

    fn manifest_url(&self, image: &ImageReference) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url,
            image.repository(),
            image.tag()
        )
    }

    /// Exchanges a challenge for a pull-scoped token at the challenge realm.
    fn request_token(&self, challenge: &AuthChallenge, image: &ImageReference) -> Result<BearerToken> {
        let mut request = HttpRequest::get(&challenge.realm);
        if let Some(service) = &challenge.service {
            request = request.query("service", service);
        }
        request = request.query("scope", image.pull_scope());

        tracing::debug!(realm = %challenge.realm, scope = %image.pull_scope(), "requesting token");
        let response = self.send(&request)?;
        if response.status != 200 {
            return Err(HatchError::UnexpectedStatus {
                url: challenge.realm.clone(),
                status: response.status,
            });
        }

        let body: TokenResponse = serde_json::from_slice(&response.body)?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .map(BearerToken::new)
            .ok_or_else(|| HatchError::MissingToken {
                realm: challenge.realm.clone(),
            })
    }

    /// Issues `request`, retrying transport failures and 5xx answers.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            let outcome = self.transport.get(request);
            let retryable = match &outcome {
                Ok(response) => response.status >= 500,
                Err(HatchError::Transport { .. }) => true,
                Err(_) => false,
            };
            if !retryable || attempt >= self.retry.max_retries {
                return outcome;
            }
            attempt += 1;
            let delay = self.retry.backoff(attempt);
            tracing::warn!(url = %request.url, attempt, delay_ms = delay.as_millis(), "retrying registry request");
            std::thread::sleep(delay);
        }
    }
}

impl<T: Transport> fmt::Debug for RegistryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("registry_url", &self.registry_url)
            .field("retry", &self.retry)
            .field("verify_digests", &self.verify_digests)
            .finish_non_exhaustive()
    }
}

fn manifest_request(url: &str) -> HttpRequest {
    HttpRequest::get(url).header("Accept", MANIFEST_MEDIA_TYPES.join(", "))
}
