use crate::feed::parser::{parse_feed, FeedParseError, ParseResult};
use crate::transport::{fetch_with_deadline, FetchOptions, Transport, TransportError};
use crate::types::{Categorized, FeedSource, NewsItem};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching one category's feed.
///
/// All of them are contained by [`FeedFetcher::fetch_categories`]: a failed
/// category contributes an empty list and never affects its siblings.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No feed is configured for the requested category
    #[error("No feed configured for category '{0}'")]
    UnknownCategory(String),
    /// Transport failure (network, timeout, blocked address, redirects)
    #[error("Feed unavailable: {0}")]
    Unavailable(#[from] TransportError),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The feed answered with an empty document
    #[error("Feed returned an empty body")]
    EmptyBody,
    /// Feed XML could not be parsed as RSS or Atom
    #[error(transparent)]
    Malformed(#[from] FeedParseError),
}

/// Fetches and parses category feeds.
#[derive(Clone)]
pub struct FeedFetcher {
    transport: Arc<dyn Transport>,
    feeds: Arc<[FeedSource]>,
    timeout: Duration,
    max_redirects: usize,
}

impl FeedFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        feeds: Vec<FeedSource>,
        timeout: Duration,
        max_redirects: usize,
    ) -> Self {
        Self {
            transport,
            feeds: feeds.into(),
            timeout,
            max_redirects,
        }
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    /// Fetches every category concurrently and waits for all of them.
    ///
    /// Buckets follow the order of `categories`. A category that fails for
    /// any reason is logged and yields an empty bucket.
    pub async fn fetch_categories(&self, categories: &[String], limit: usize) -> Categorized {
        let results: Vec<(String, Vec<NewsItem>)> = stream::iter(categories.iter().cloned())
            .map(|category| async move {
                let items = match self.fetch_category(&category, limit).await {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!(category = %category, error = %e, "Category fetch failed, continuing without it");
                        Vec::new()
                    }
                };
                (category, items)
            })
            .buffered(categories.len().max(1))
            .collect()
            .await;

        let mut categorized = Categorized::with_buckets(categories.iter().cloned());
        for (category, items) in results {
            if let Some(bucket) = categorized.bucket_mut(&category) {
                bucket.extend(items);
            }
        }

        tracing::info!(
            categories = categories.len(),
            items = categorized.total_items(),
            "Fetched category feeds"
        );
        categorized
    }

    /// Fetches one category: items stamped with the category, in feed order,
    /// truncated to `limit`.
    pub async fn fetch_category(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<NewsItem>, FeedError> {
        let source = self
            .feeds
            .iter()
            .find(|f| f.category == category)
            .ok_or_else(|| FeedError::UnknownCategory(category.to_string()))?;

        let options = FetchOptions::get(self.timeout).max_redirects(self.max_redirects);
        let doc = fetch_with_deadline(self.transport.as_ref(), &source.feed_url, &options).await?;

        if !doc.is_success() {
            return Err(FeedError::HttpStatus(doc.status));
        }
        if doc.body.trim().is_empty() {
            return Err(FeedError::EmptyBody);
        }

        let ParseResult { items, skipped } = parse_feed(&doc.body)?;
        if skipped > 0 {
            tracing::warn!(
                category = %category,
                skipped = skipped,
                "Entries without title or link skipped"
            );
        }

        let parsed = items.len();
        let items: Vec<NewsItem> = items
            .into_iter()
            .take(limit)
            .map(|mut item| {
                item.category = Some(category.to_string());
                item
            })
            .collect();

        tracing::debug!(
            category = %category,
            parsed = parsed,
            kept = items.len(),
            "Parsed category feed"
        );
        Ok(items)
    }
}
