//! Feed retrieval: fetching, parsing and grouping category feeds.
//!
//! - [`parser`] - RSS 2.0 / Atom parsing on `feed-rs`, with the image and
//!   publisher extraction heuristics
//! - [`fetcher`] - Concurrent per-category fetch with failure isolation
//! - [`collate`] - Link deduplication and category bucketing
//!
//! # Example
//!
//! ```
//! use newsreel::feed::{dedup_by_link, parse_feed};
//!
//! let xml = r#"<rss version="2.0"><channel><title>頭條</title>
//!   <item><title>【中央社】頭條</title><link>https://www.cna.com.tw/1</link></item>
//!   <item><title>重複</title><link>https://www.cna.com.tw/1</link></item>
//! </channel></rss>"#;
//!
//! let parsed = parse_feed(xml).unwrap();
//! assert_eq!(parsed.items[0].source_name.as_deref(), Some("中央社"));
//! assert_eq!(dedup_by_link(parsed.items).len(), 1);
//! ```

mod collate;
mod fetcher;
mod parser;

pub use collate::{categorize, dedup_by_link};
pub use fetcher::{FeedError, FeedFetcher};
pub use parser::{parse_feed, source_from_title, FeedParseError, ParseResult};
