//! Outbound document fetching.
//!
//! Everything that touches the network goes through [`Transport`]. The
//! production implementation is [`HttpTransport`]; tests substitute in-memory
//! transports. Callers never await a transport directly: [`fetch_with_deadline`]
//! bounds every call by its own timeout, and dropping the timed-out future
//! cancels exactly that call.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{is_private_host, validate_url};

const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// HTTP method used for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    /// Existence probe: no body is read.
    Head,
}

/// Per-call options for [`Transport::fetch_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub method: Method,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl FetchOptions {
    pub fn get(timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            timeout,
            follow_redirects: true,
            max_redirects: 5,
        }
    }

    pub fn head(timeout: Duration) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(timeout)
        }
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

/// A fetched document. `final_url` is the URL actually reached after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

impl FetchedDocument {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 2xx or 3xx: the resource exists, even if it points elsewhere.
    pub fn exists(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Errors raised while fetching a document.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL (or a redirect target) is not a fetchable http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// SEC: target resolves to localhost or a private network
    #[error("Refusing to fetch private address: {0}")]
    Blocked(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The resource could not be retrieved for a non-HTTP reason
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// More redirect hops than the call allows
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Issues one outbound request and returns the document it reached.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_document(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedDocument, TransportError>;
}

/// Runs one transport call under its own deadline.
pub async fn fetch_with_deadline(
    transport: &dyn Transport,
    url: &str,
    options: &FetchOptions,
) -> Result<FetchedDocument, TransportError> {
    tokio::time::timeout(options.timeout, transport.fetch_document(url, options))
        .await
        .map_err(|_| TransportError::Timeout(options.timeout))?
}

/// [`Transport`] over `reqwest`.
///
/// The client never follows redirects on its own; hops are walked here so the
/// per-call limit is honored and every hop passes the same URL checks.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpTransport {
    pub fn new(user_agent: &str, allow_private_hosts: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            allow_private_hosts,
        })
    }

    fn check_target(&self, url: &str) -> Result<Url, TransportError> {
        let parsed = validate_url(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if !self.allow_private_hosts && is_private_host(&parsed) {
            return Err(TransportError::Blocked(parsed.to_string()));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_document(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedDocument, TransportError> {
        let method = match options.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        };
        let mut current = self.check_target(url)?;
        let mut hops = 0;

        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .timeout(options.timeout)
                .send()
                .await
                .map_err(|e| network_error(e, options.timeout))?;
            let status = response.status();

            if options.follow_redirects && status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);

                if let Some(location) = location {
                    if hops >= options.max_redirects {
                        return Err(TransportError::TooManyRedirects(options.max_redirects));
                    }
                    let next = current
                        .join(&location)
                        .map_err(|e| TransportError::InvalidUrl(format!("{location}: {e}")))?;
                    tracing::debug!(from = %current, to = %next, hop = hops + 1, "Following redirect");
                    current = self.check_target(next.as_str())?;
                    hops += 1;
                    continue;
                }
            }

            let body = match options.method {
                Method::Head => String::new(),
                Method::Get => {
                    let bytes = read_limited_bytes(response, MAX_DOCUMENT_SIZE, options.timeout).await?;
                    String::from_utf8_lossy(&bytes).into_owned()
                }
            };

            return Ok(FetchedDocument {
                status: status.as_u16(),
                final_url: current.to_string(),
                body,
            });
        }
    }
}

/// The client's own per-request timeout fires alongside the
/// [`fetch_with_deadline`] deadline; both surface as `Timeout`.
fn network_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Network(e)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| network_error(e, timeout))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
