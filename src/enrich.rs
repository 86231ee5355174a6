//! Batched image enrichment.
//!
//! Only the first few image-less items of each category are enriched. They are
//! processed in fixed-size batches: batches run one after another, items
//! within a batch run concurrently. Every item ends with an image, either from
//! its page or from the fallback tables.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::resolve::{format_site_name, source_image, MetadataResolver, UNKNOWN_SOURCE};
use crate::sink::{PresentationSink, ProgressSink};
use crate::types::{Categorized, ImageOrigin};

/// Counts for one enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    pub selected: usize,
    pub page_images: usize,
    pub fallback_images: usize,
}

/// An item chosen for enrichment, addressed by bucket and position.
#[derive(Debug, Clone)]
struct Target {
    category: String,
    index: usize,
    link: String,
    source_name: Option<String>,
}

struct Outcome {
    image_url: String,
    origin: ImageOrigin,
    site_name: Option<String>,
}

#[derive(Clone)]
pub struct EnrichmentScheduler {
    resolver: MetadataResolver,
    batch_size: usize,
    item_timeout: Duration,
}

impl EnrichmentScheduler {
    pub fn new(resolver: MetadataResolver, batch_size: usize, item_timeout: Duration) -> Self {
        Self {
            resolver,
            batch_size: batch_size.max(1),
            item_timeout,
        }
    }

    /// Enriches up to `per_category` image-less items per category in place.
    ///
    /// Progress is reported after every item as `completed / selected * 100`,
    /// reaching exactly 100 once. With nothing to do, 100 is reported
    /// immediately.
    pub async fn enrich(
        &self,
        items: &mut Categorized,
        per_category: usize,
        progress: &dyn ProgressSink,
        presentation: &dyn PresentationSink,
    ) -> EnrichmentReport {
        let targets = select_targets(items, per_category);
        let total = targets.len();
        let mut report = EnrichmentReport {
            selected: total,
            ..EnrichmentReport::default()
        };

        if total == 0 {
            progress.on_progress(100.0);
            return report;
        }

        let completed = &AtomicUsize::new(0);
        for (n, batch) in targets.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = n + 1, size = batch.len(), "Enriching batch");

            let outcomes = join_all(batch.iter().map(|target| async move {
                let outcome = self.enrich_one(target).await;
                presentation.on_image_resolved(&target.link, &outcome.image_url);

                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                progress.on_progress(done as f64 / total as f64 * 100.0);
                outcome
            }))
            .await;

            for (target, outcome) in batch.iter().zip(outcomes) {
                match outcome.origin {
                    ImageOrigin::Page => report.page_images += 1,
                    ImageOrigin::Fallback => report.fallback_images += 1,
                }
                apply(items, target, outcome);
            }
        }

        tracing::info!(
            selected = report.selected,
            page_images = report.page_images,
            fallback_images = report.fallback_images,
            "Enrichment finished"
        );
        report
    }

    async fn enrich_one(&self, target: &Target) -> Outcome {
        match tokio::time::timeout(self.item_timeout, self.resolver.resolve(&target.link)).await {
            Ok(metadata) => {
                let site_name = Some(metadata.site_name)
                    .filter(|name| !name.is_empty() && name.as_str() != UNKNOWN_SOURCE);
                Outcome {
                    image_url: metadata.image_url,
                    origin: metadata.image_origin,
                    site_name,
                }
            }
            Err(_) => {
                tracing::warn!(
                    link = %target.link,
                    timeout = ?self.item_timeout,
                    "Enrichment timed out, using fallback image"
                );
                let source = format_site_name(target.source_name.as_deref().unwrap_or_default());
                Outcome {
                    image_url: source_image(&source).to_string(),
                    origin: ImageOrigin::Fallback,
                    site_name: None,
                }
            }
        }
    }
}

fn select_targets(items: &Categorized, per_category: usize) -> Vec<Target> {
    items
        .iter()
        .flat_map(|(category, bucket)| {
            bucket
                .iter()
                .enumerate()
                .filter(|(_, item)| !item.has_image())
                .take(per_category)
                .map(move |(index, item)| Target {
                    category: category.to_string(),
                    index,
                    link: item.link.clone(),
                    source_name: item.source_name.clone(),
                })
        })
        .collect()
}

fn apply(items: &mut Categorized, target: &Target, outcome: Outcome) {
    let Some(item) = items
        .bucket_mut(&target.category)
        .and_then(|bucket| bucket.get_mut(target.index))
    else {
        return;
    };

    item.image_url = Some(outcome.image_url);
    let has_source = item.source_name.as_deref().is_some_and(|s| !s.is_empty());
    if !has_source {
        if let Some(site_name) = outcome.site_name {
            item.source_name = Some(site_name);
        }
    }
}
