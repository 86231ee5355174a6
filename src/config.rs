//! Configuration file parser for ~/.config/newsreel/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! which carries the built-in category feeds. Unknown keys are ignored by serde
//! but logged as warnings, since they are usually typos.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resolve::{RedirectPolicy, WrapperHosts};
use crate::types::FeedSource;
use crate::util::validate_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Note that a `[[feeds]]` list replaces the built-in feeds entirely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket for items whose category is missing or unknown.
    pub default_category: String,

    /// Maximum items kept per category, from the front of each feed.
    pub per_category_limit: usize,

    /// Image-less items enriched per category.
    pub images_to_resolve: usize,

    /// Items enriched concurrently; batches run one after another.
    pub batch_size: usize,

    /// Redirect hops allowed per request.
    pub max_redirects: usize,

    pub user_agent: String,

    /// Aggregator hosts whose links must be unwrapped before scraping.
    pub wrapper_hosts: Vec<String>,

    /// Allow fetching localhost and private-network addresses.
    pub allow_private_hosts: bool,

    /// Resolve the lead story's image before returning results.
    pub prefetch_featured: bool,

    pub timeouts: Timeouts,

    /// Category feeds, in display order.
    pub feeds: Vec<FeedSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_category: "頭條".to_string(),
            per_category_limit: 13,
            images_to_resolve: 20,
            batch_size: 40,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            wrapper_hosts: vec!["news.google.com".to_string()],
            allow_private_hosts: false,
            prefetch_featured: true,
            timeouts: Timeouts::default(),
            feeds: default_feeds(),
        }
    }
}

const DEFAULT_USER_AGENT: &str = concat!("newsreel/", env!("CARGO_PKG_VERSION"));

const DEFAULT_FEEDS: &[(&str, &str)] = &[
    ("頭條", "https://tw.news.yahoo.com/rss/"),
    ("政治", "https://tw.news.yahoo.com/rss/politics"),
    ("財經", "https://tw.news.yahoo.com/rss/finance"),
    ("國際", "https://news.yahoo.com/rss/world"),
    ("娛樂", "https://tw.news.yahoo.com/rss/entertainment"),
    ("體育", "https://tw.news.yahoo.com/rss/sports"),
    ("科技", "https://tw.news.yahoo.com/rss/technology"),
    ("健康", "https://tw.news.yahoo.com/rss/health"),
    ("生活", "https://tw.news.yahoo.com/rss/lifestyle"),
    ("AI", "https://news.yahoo.com/rss/ai"),
    ("Economy", "https://news.yahoo.com/rss/economy"),
];

fn default_feeds() -> Vec<FeedSource> {
    DEFAULT_FEEDS
        .iter()
        .map(|(category, url)| FeedSource::new(*category, *url))
        .collect()
}

/// Per-call deadlines, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Feed document fetch.
    pub feed_secs: u64,
    /// HEAD probe for ordinary links.
    pub probe_secs: u64,
    /// GET through an aggregator wrapper link.
    pub wrapper_secs: u64,
    /// Destination page fetch for metadata.
    pub metadata_secs: u64,
    /// Whole enrichment of one item.
    pub item_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feed_secs: 10,
            probe_secs: 8,
            wrapper_secs: 10,
            metadata_secs: 10,
            item_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn feed(&self) -> Duration {
        Duration::from_secs(self.feed_secs)
    }

    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn item(&self) -> Duration {
        Duration::from_secs(self.item_secs)
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "default_category",
        "per_category_limit",
        "images_to_resolve",
        "batch_size",
        "max_redirects",
        "user_agent",
        "wrapper_hosts",
        "allow_private_hosts",
        "prefetch_featured",
        "timeouts",
        "feeds",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Parsed but inconsistent values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks values serde cannot: non-zero sizes and deadlines, unique
    /// categories, fetchable feed URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.default_category.trim().is_empty() {
            return Err(ConfigError::Invalid("default_category must not be empty".into()));
        }

        let t = &self.timeouts;
        if [t.feed_secs, t.probe_secs, t.wrapper_secs, t.metadata_secs, t.item_secs].contains(&0) {
            return Err(ConfigError::Invalid("timeouts must be at least 1 second".into()));
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if !seen.insert(feed.category.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate feed category '{}'",
                    feed.category
                )));
            }
            if let Err(e) = validate_url(&feed.feed_url) {
                return Err(ConfigError::Invalid(format!(
                    "feed '{}' has an invalid url: {e}",
                    feed.category
                )));
            }
        }
        Ok(())
    }

    /// Configured categories in display order.
    pub fn categories(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.category.clone()).collect()
    }

    pub fn wrapper_hosts(&self) -> WrapperHosts {
        WrapperHosts::new(self.wrapper_hosts.iter().cloned())
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        RedirectPolicy {
            probe_timeout: Duration::from_secs(self.timeouts.probe_secs),
            wrapper_timeout: Duration::from_secs(self.timeouts.wrapper_secs),
            max_redirects: self.max_redirects,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
