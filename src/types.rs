use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use url::Url;

// ============================================================================
// Feed configuration
// ============================================================================

/// A category and the feed that supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub category: String,
    #[serde(rename = "url")]
    pub feed_url: String,
}

impl FeedSource {
    pub fn new(category: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            feed_url: feed_url.into(),
        }
    }
}

// ============================================================================
// News items
// ============================================================================

/// One entry taken from a feed.
///
/// `link` is the identity key: deduplication compares it verbatim, before any
/// redirect resolution. `image_url` and `source_name` may be filled in later
/// by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub description: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub source_name: Option<String>,
}

impl NewsItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            published_at: None,
            description: String::new(),
            image_url: None,
            category: None,
            source_name: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

// ============================================================================
// Link and metadata resolution
// ============================================================================

/// Outcome of unwrapping a link. Exactly one variant, always produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLink {
    /// A validated absolute http(s) URL that is safe to scrape.
    Final(Url),
    /// The link could not be unwrapped; carries a best-effort publisher name.
    Unresolved { guessed_source: Option<String> },
}

impl ResolvedLink {
    pub fn final_url(&self) -> Option<&Url> {
        match self {
            ResolvedLink::Final(url) => Some(url),
            ResolvedLink::Unresolved { .. } => None,
        }
    }
}

/// Why a preview record is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionError {
    /// An aggregator wrapper link could not be unwrapped.
    RedirectUnresolved,
    /// The destination page could not be fetched in time.
    MetadataFetchFailed,
    /// The item link is not an http(s) URL.
    InvalidUrl,
}

/// Where a preview image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageOrigin {
    Page,
    Fallback,
}

/// Preview metadata for one link. `image_url` and `favicon` are never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub source_url: String,
    pub original_url: String,
    pub title: String,
    pub description: String,
    pub site_name: String,
    pub image_url: String,
    pub image_origin: ImageOrigin,
    pub favicon: String,
    pub alternative_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<ResolutionError>,
}

// ============================================================================
// Requests and results
// ============================================================================

/// One aggregation run: which categories, and how much work to do per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationRequest {
    pub categories: Vec<String>,
    pub per_category_limit: usize,
    pub images_to_resolve: usize,
    pub prefetch_featured: bool,
}

impl AggregationRequest {
    /// Builds a request; repeated categories keep their first position.
    pub fn new<I, S>(categories: I, per_category_limit: usize, images_to_resolve: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for category in categories {
            let category = category.into();
            if !unique.contains(&category) {
                unique.push(category);
            }
        }
        Self {
            categories: unique,
            per_category_limit,
            images_to_resolve,
            prefetch_featured: true,
        }
    }

    pub fn prefetch_featured(mut self, enabled: bool) -> Self {
        self.prefetch_featured = enabled;
        self
    }
}

/// Items grouped by category, buckets kept in request order.
///
/// Serializes as a JSON object whose keys follow bucket order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categorized {
    buckets: Vec<(String, Vec<NewsItem>)>,
}

impl Categorized {
    /// Creates empty buckets for the given categories (duplicates ignored).
    pub fn with_buckets<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categorized = Self::default();
        for category in categories {
            categorized.ensure_bucket(&category.into());
        }
        categorized
    }

    pub(crate) fn ensure_bucket(&mut self, category: &str) {
        if !self.buckets.iter().any(|(c, _)| c == category) {
            self.buckets.push((category.to_string(), Vec::new()));
        }
    }

    pub(crate) fn bucket_mut(&mut self, category: &str) -> Option<&mut Vec<NewsItem>> {
        self.buckets
            .iter_mut()
            .find(|(c, _)| c == category)
            .map(|(_, items)| items)
    }

    pub fn get(&self, category: &str) -> Option<&[NewsItem]> {
        self.buckets
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, items)| items.as_slice())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.buckets.iter().any(|(c, _)| c == category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[NewsItem])> {
        self.buckets
            .iter()
            .map(|(c, items)| (c.as_str(), items.as_slice()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NewsItem> {
        self.buckets.iter_mut().flat_map(|(_, items)| items.iter_mut())
    }

    pub fn total_items(&self) -> usize {
        self.buckets.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// All items in bucket order.
    pub fn flatten(&self) -> impl Iterator<Item = &NewsItem> {
        self.buckets.iter().flat_map(|(_, items)| items.iter())
    }
}

impl Serialize for Categorized {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (category, items) in &self.buckets {
            map.serialize_entry(category, items)?;
        }
        map.end()
    }
}
