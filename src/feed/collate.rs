use std::collections::HashSet;

use crate::types::{Categorized, NewsItem};

/// Drops items whose `link` was already seen, keeping the first occurrence.
///
/// Order-preserving and idempotent. Links are compared verbatim.
pub fn dedup_by_link(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let before = items.len();
    let unique: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.link.clone()))
        .collect();

    if unique.len() < before {
        tracing::debug!(removed = before - unique.len(), "Removed duplicate links");
    }
    unique
}

/// Groups items into buckets for `known` categories, in that order.
///
/// Items whose category is missing or not in `known` go to `default`
/// (appended as the last bucket when it is not already known) and are
/// re-stamped with it. Nothing is dropped.
pub fn categorize(items: Vec<NewsItem>, known: &[String], default: &str) -> Categorized {
    let mut categorized = Categorized::with_buckets(known.iter().cloned());

    for mut item in items {
        let bucket = item
            .category
            .as_deref()
            .filter(|category| categorized.contains(category))
            .map(str::to_string);
        let target = match bucket {
            Some(category) => category,
            None => {
                categorized.ensure_bucket(default);
                item.category = Some(default.to_string());
                default.to_string()
            }
        };
        if let Some(bucket) = categorized.bucket_mut(&target) {
            bucket.push(item);
        }
    }

    for (category, items) in categorized.iter() {
        tracing::debug!(category = %category, count = items.len(), "Categorized items");
    }
    categorized
}
