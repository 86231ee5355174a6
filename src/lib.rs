//! Categorized news aggregation.
//!
//! Category feeds are fetched concurrently, deduplicated by link and grouped
//! per category. Aggregator wrapper links are unwrapped to the publisher's
//! page, and preview images are scraped in batches in the background.
//!
//! The entry point is [`Aggregator`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use newsreel::{AggregationRequest, Aggregator, Config, TracingSink};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let aggregator = Aggregator::with_http(&config, Arc::new(TracingSink), Arc::new(TracingSink))?;
//!
//! let request = AggregationRequest::new(["科技", "財經"], 13, 20);
//! let aggregation = aggregator.aggregate(&request).await?;
//! for item in aggregation.flatten() {
//!     println!("{}", item.title);
//! }
//! let enriched = aggregation.enriched().await;
//! println!("{} images resolved", enriched.report.page_images);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod enrich;
pub mod feed;
pub mod resolve;
pub mod sink;
pub mod transport;
pub mod types;
pub mod util;

pub use aggregator::{AggregateError, Aggregation, Aggregator, Enriched};
pub use config::{Config, ConfigError};
pub use enrich::EnrichmentReport;
pub use sink::{NoopSink, PresentationSink, ProgressSink, TracingSink};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{AggregationRequest, Categorized, NewsItem, PreviewMetadata, ResolvedLink};
