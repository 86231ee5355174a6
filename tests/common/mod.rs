//! Shared fixtures for integration tests: an in-memory transport and a sink
//! that records every notification.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use newsreel::transport::{FetchOptions, FetchedDocument, Method};
use newsreel::{PresentationSink, ProgressSink, Transport, TransportError};

/// Serves canned bodies by exact URL. Unknown URLs fail.
#[derive(Default)]
pub struct MapTransport {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<(String, Method)>>,
}

impl MapTransport {
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, Method)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MapTransport {
    async fn fetch_document(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchedDocument, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.method));
        match self.pages.get(url) {
            Some(body) => Ok(FetchedDocument {
                status: 200,
                final_url: url.to_string(),
                body: body.clone(),
            }),
            None => Err(TransportError::Unavailable(url.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    End,
    Progress(f64),
    Error(String),
    Image { link: String, image_url: String },
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, percent: f64) {
        self.push(Event::Progress(percent));
    }

    fn on_loading_start(&self) {
        self.push(Event::Start);
    }

    fn on_loading_end(&self) {
        self.push(Event::End);
    }

    fn on_error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}

impl PresentationSink for RecordingSink {
    fn on_image_resolved(&self, link: &str, image_url: &str) {
        self.push(Event::Image {
            link: link.to_string(),
            image_url: image_url.to_string(),
        });
    }
}

/// RSS 2.0 document with one `<item>` per `(title, link)`.
pub fn rss(items: &[(&str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(title, link)| format!("<item><title>{title}</title><link>{link}</link></item>"))
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>feed</title>{entries}</channel></rss>"#)
}

/// Article page carrying an Open Graph image.
pub fn article(image: &str) -> String {
    format!(r#"<html><head><title>Article</title><meta property="og:image" content="{image}"></head><body></body></html>"#)
}
