//! HTTP transport used by the registry client.
//!
//! The registry protocol only needs `GET` with query parameters and
//! headers, so the seam is a single method. [`HttpTransport`] implements it
//! with `reqwest`'s blocking client; tests substitute scripted fakes.

use std::fmt;

use hatch_common::error::{HatchError, Result};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, WWW_AUTHENTICATE};

/// A `GET` request to be issued by a [`Transport`].
#[derive(Clone, Default)]
pub struct HttpRequest {
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Request headers, in order.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the value of the first query parameter named `key`.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &headers)
            .finish()
    }
}

/// The parts of an HTTP response the registry protocol looks at.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// `WWW-Authenticate` header, if present.
    pub www_authenticate: Option<String>,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Full response body.
    pub body: Vec<u8>,
}

/// Something that can perform an HTTP `GET`.
pub trait Transport: Send + Sync {
    /// Issues `request` and returns the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::Transport` only when no response was obtained
    /// (DNS, connect, TLS, or body read failure).
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).get(request)
    }
}

/// [`Transport`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Builds a client that identifies itself as hatch.
    ///
    /// # Errors
    ///
    /// Returns `HatchError::Config` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("hatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HatchError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let transport_err = |e: reqwest::Error| HatchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %request.url, "GET");
        let response = builder.send().map_err(transport_err)?;
        let status = response.status().as_u16();
        let www_authenticate = header_value(response.headers(), &WWW_AUTHENTICATE);
        let content_type = header_value(response.headers(), &CONTENT_TYPE);
        let body = response.bytes().map_err(transport_err)?.to_vec();
        tracing::debug!(url = %request.url, status, bytes = body.len(), "response");

        Ok(HttpResponse {
            status,
            www_authenticate,
            content_type,
            body,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
