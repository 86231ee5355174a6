use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::sources::guess_source;
use crate::transport::{fetch_with_deadline, FetchOptions, Transport};
use crate::types::ResolvedLink;
use crate::util::validate_url;

/// Hosts of aggregator indirection services whose links must be unwrapped.
///
/// A host matches itself and any of its subdomains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperHosts(Vec<String>);

impl WrapperHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            hosts
                .into_iter()
                .map(|h| h.into().trim().trim_start_matches('.').to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        )
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.0
            .iter()
            .any(|w| host == *w || host.ends_with(&format!(".{w}")))
    }

    /// Unparseable text falls back to a substring check.
    pub fn matches(&self, link: &str) -> bool {
        match Url::parse(link.trim()) {
            Ok(url) => self.matches_url(&url),
            Err(_) => {
                let lowered = link.to_lowercase();
                self.0.iter().any(|w| lowered.contains(w.as_str()))
            }
        }
    }
}

impl Default for WrapperHosts {
    fn default() -> Self {
        Self::new(["news.google.com"])
    }
}

/// Timing and hop limits for link resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub probe_timeout: Duration,
    pub wrapper_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(8),
            wrapper_timeout: Duration::from_secs(10),
            max_redirects: 5,
        }
    }
}

/// Unwraps item links to the publisher URL that should be scraped.
///
/// Every call makes at most one transport request, bounded by its deadline,
/// and returns exactly one [`ResolvedLink`] variant. There are no retries.
#[derive(Clone)]
pub struct RedirectResolver {
    transport: Arc<dyn Transport>,
    wrappers: WrapperHosts,
    policy: RedirectPolicy,
}

impl RedirectResolver {
    pub fn new(transport: Arc<dyn Transport>, wrappers: WrapperHosts, policy: RedirectPolicy) -> Self {
        Self {
            transport,
            wrappers,
            policy,
        }
    }

    pub fn wrappers(&self) -> &WrapperHosts {
        &self.wrappers
    }

    pub async fn resolve(&self, link: &str) -> ResolvedLink {
        let Ok(original) = validate_url(link) else {
            tracing::debug!(link = %link, "Link is not an http(s) URL");
            return unresolved(link);
        };

        if self.wrappers.matches_url(&original) {
            self.resolve_wrapper(link, &original).await
        } else {
            self.resolve_ordinary(link, original).await
        }
    }

    /// Ordinary links: a HEAD probe. No redirect, or a failed probe, keeps the
    /// original link as final.
    async fn resolve_ordinary(&self, link: &str, original: Url) -> ResolvedLink {
        let options = FetchOptions::head(self.policy.probe_timeout)
            .max_redirects(self.policy.max_redirects);

        match fetch_with_deadline(self.transport.as_ref(), link, &options).await {
            Ok(doc) if doc.exists() && doc.final_url != link => match validate_url(&doc.final_url) {
                Ok(reached) => {
                    tracing::debug!(from = %link, to = %reached, "Link redirected");
                    ResolvedLink::Final(reached)
                }
                Err(_) => ResolvedLink::Final(original),
            },
            Ok(_) => ResolvedLink::Final(original),
            Err(e) => {
                tracing::debug!(link = %link, error = %e, "Redirect probe failed, keeping original link");
                ResolvedLink::Final(original)
            }
        }
    }

    /// Wrapper links: one full GET, then accept the reached URL only if it
    /// left the wrapper service.
    async fn resolve_wrapper(&self, link: &str, original: &Url) -> ResolvedLink {
        let options =
            FetchOptions::get(self.policy.wrapper_timeout).max_redirects(self.policy.max_redirects);

        match fetch_with_deadline(self.transport.as_ref(), link, &options).await {
            Ok(doc) if doc.is_success() => match validate_url(&doc.final_url) {
                Ok(reached) if reached != *original && !self.wrappers.matches_url(&reached) => {
                    tracing::debug!(from = %link, to = %reached, "Wrapper link unwrapped");
                    return ResolvedLink::Final(reached);
                }
                _ => {
                    tracing::warn!(link = %link, reached = %doc.final_url, "Wrapper link did not leave the wrapper service");
                }
            },
            Ok(doc) => {
                tracing::warn!(link = %link, status = doc.status, "Wrapper link returned an error status");
            }
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Wrapper link request failed");
            }
        }

        unresolved(link)
    }
}

fn unresolved(link: &str) -> ResolvedLink {
    let guessed_source = guess_source(link).map(str::to_owned);
    match &guessed_source {
        Some(source) => tracing::debug!(link = %link, source = %source, "Guessed source from link text"),
        None => tracing::debug!(link = %link, "No source could be guessed from link text"),
    }
    ResolvedLink::Unresolved { guessed_source }
}
