//! Observers of an aggregation run.
//!
//! The aggregator reports loading state and progress to a [`ProgressSink`], and
//! newly known item images to a [`PresentationSink`]. Both are handed to the
//! [`Aggregator`](crate::aggregator::Aggregator) at construction.

/// Loading state and enrichment progress.
pub trait ProgressSink: Send + Sync {
    /// Percentage in `0.0..=100.0`, non-decreasing within one run.
    fn on_progress(&self, percent: f64);
    fn on_loading_start(&self);
    fn on_loading_end(&self);
    fn on_error(&self, message: &str);
}

/// Receives item images as they become known.
pub trait PresentationSink: Send + Sync {
    fn on_image_resolved(&self, link: &str, image_url: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _percent: f64) {}
    fn on_loading_start(&self) {}
    fn on_loading_end(&self) {}
    fn on_error(&self, _message: &str) {}
}

impl PresentationSink for NoopSink {
    fn on_image_resolved(&self, _link: &str, _image_url: &str) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, percent: f64) {
        tracing::debug!(percent = percent, "Enrichment progress");
    }

    fn on_loading_start(&self) {
        tracing::info!("Loading news");
    }

    fn on_loading_end(&self) {
        tracing::info!("Loading finished");
    }

    fn on_error(&self, message: &str) {
        tracing::error!(message = %message, "Aggregation failed");
    }
}

impl PresentationSink for TracingSink {
    fn on_image_resolved(&self, link: &str, image_url: &str) {
        tracing::debug!(link = %link, image = %image_url, "Image resolved");
    }
}
