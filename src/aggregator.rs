use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::enrich::{EnrichmentReport, EnrichmentScheduler};
use crate::feed::{categorize, dedup_by_link, FeedFetcher};
use crate::resolve::{MetadataResolver, RedirectResolver, UNKNOWN_SOURCE};
use crate::sink::{PresentationSink, ProgressSink};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::types::{AggregationRequest, Categorized, NewsItem};

/// The only failure surfaced to callers: the whole request produced nothing.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("No news items available for {}", .categories.join(", "))]
    NoItems { categories: Vec<String> },
}

/// Runs one request end to end: fetch, deduplicate, categorize, then enrich
/// images in the background.
///
/// Sinks are supplied at construction and shared by every run.
pub struct Aggregator {
    fetcher: FeedFetcher,
    metadata: MetadataResolver,
    scheduler: EnrichmentScheduler,
    default_category: String,
    progress: Arc<dyn ProgressSink>,
    presentation: Arc<dyn PresentationSink>,
}

impl Aggregator {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        progress: Arc<dyn ProgressSink>,
        presentation: Arc<dyn PresentationSink>,
    ) -> Self {
        let timeouts = config.timeouts;
        let fetcher = FeedFetcher::new(
            transport.clone(),
            config.feeds.clone(),
            timeouts.feed(),
            config.max_redirects,
        );
        let redirects = RedirectResolver::new(
            transport.clone(),
            config.wrapper_hosts(),
            config.redirect_policy(),
        );
        let metadata =
            MetadataResolver::new(redirects, transport, timeouts.metadata(), config.max_redirects);
        let scheduler = EnrichmentScheduler::new(metadata.clone(), config.batch_size, timeouts.item());

        Self {
            fetcher,
            metadata,
            scheduler,
            default_category: config.default_category.clone(),
            progress,
            presentation,
        }
    }

    /// Builds an aggregator over [`HttpTransport`].
    pub fn with_http(
        config: &Config,
        progress: Arc<dyn ProgressSink>,
        presentation: Arc<dyn PresentationSink>,
    ) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.user_agent, config.allow_private_hosts)?;
        Ok(Self::new(config, Arc::new(transport), progress, presentation))
    }

    /// Configured categories, in display order.
    pub fn available_categories(&self) -> Vec<String> {
        self.fetcher
            .feeds()
            .iter()
            .map(|f| f.category.clone())
            .collect()
    }

    /// Fetches and groups the requested categories.
    ///
    /// An empty category list means every configured category. Returns as
    /// soon as items are grouped (and the featured item prefetched); image
    /// enrichment continues in a spawned task, see [`Aggregation::enriched`].
    pub async fn aggregate(&self, request: &AggregationRequest) -> Result<Aggregation, AggregateError> {
        self.progress.on_loading_start();

        let categories = if request.categories.is_empty() {
            self.available_categories()
        } else {
            request.categories.clone()
        };

        let fetched = self
            .fetcher
            .fetch_categories(&categories, request.per_category_limit)
            .await;
        let unique = dedup_by_link(fetched.flatten().cloned().collect());
        let mut items = categorize(unique, &categories, &self.default_category);

        if items.is_empty() {
            let error = AggregateError::NoItems { categories };
            tracing::warn!(error = %error, "Aggregation produced no items");
            self.progress.on_error(&error.to_string());
            self.progress.on_loading_end();
            return Err(error);
        }

        if request.prefetch_featured {
            self.prefetch_featured(&mut items).await;
        }
        self.progress.on_loading_end();

        tracing::info!(
            categories = categories.len(),
            items = items.total_items(),
            "Aggregation ready"
        );

        let enrichment = self.spawn_enrichment(items.clone(), request.images_to_resolve);
        Ok(Aggregation { items, enrichment })
    }

    /// Resolves the lead item's image so it can be shown right away.
    async fn prefetch_featured(&self, items: &mut Categorized) {
        let Some(featured) = items
            .iter_mut()
            .next()
            .filter(|item| !item.has_image())
        else {
            return;
        };

        let metadata = self.metadata.resolve(&featured.link).await;
        tracing::debug!(link = %featured.link, image = %metadata.image_url, "Prefetched featured image");
        self.presentation
            .on_image_resolved(&featured.link, &metadata.image_url);

        featured.image_url = Some(metadata.image_url);
        let has_source = featured.source_name.as_deref().is_some_and(|s| !s.is_empty());
        if !has_source && !metadata.site_name.is_empty() && metadata.site_name != UNKNOWN_SOURCE {
            featured.source_name = Some(metadata.site_name);
        }
    }

    fn spawn_enrichment(&self, mut items: Categorized, per_category: usize) -> JoinHandle<Enriched> {
        let scheduler = self.scheduler.clone();
        let progress = Arc::clone(&self.progress);
        let presentation = Arc::clone(&self.presentation);

        tokio::spawn(async move {
            let report = scheduler
                .enrich(&mut items, per_category, progress.as_ref(), presentation.as_ref())
                .await;
            Enriched { items, report }
        })
    }
}

/// Result of [`Aggregator::aggregate`]: grouped items plus the background
/// enrichment of their images.
pub struct Aggregation {
    items: Categorized,
    enrichment: JoinHandle<Enriched>,
}

/// Items after enrichment, with the run's counts.
#[derive(Debug, Clone)]
pub struct Enriched {
    pub items: Categorized,
    pub report: EnrichmentReport,
}

impl Aggregation {
    /// Items as grouped, before background enrichment.
    pub fn items(&self) -> &Categorized {
        &self.items
    }

    /// All items in bucket order.
    pub fn flatten(&self) -> impl Iterator<Item = &NewsItem> {
        self.items.flatten()
    }

    /// Waits for enrichment. If the enrichment task died, the unenriched
    /// items are returned with an empty report.
    pub async fn enriched(self) -> Enriched {
        match self.enrichment.await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::error!(error = %e, "Enrichment task failed");
                Enriched {
                    items: self.items,
                    report: EnrichmentReport::default(),
                }
            }
        }
    }

    /// Stops background enrichment and keeps the grouped items.
    pub fn into_items(self) -> Categorized {
        self.enrichment.abort();
        self.items
    }
}
