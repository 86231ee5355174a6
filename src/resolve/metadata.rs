use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use super::redirect::RedirectResolver;
use super::sources::{
    domain_of, format_site_name, guess_source, source_favicon, source_image, GENERIC_FAVICON,
    GENERIC_IMAGE, UNKNOWN_SOURCE,
};
use crate::transport::{fetch_with_deadline, FetchOptions, Transport};
use crate::types::{ImageOrigin, PreviewMetadata, ResolutionError, ResolvedLink};
use crate::util::{strip_control_chars, validate_url};

const MAX_ALTERNATIVE_IMAGES: usize = 5;
const MIN_IMAGE_SRC_LEN: usize = 10;

/// Builds preview records for item links.
///
/// [`resolve`](Self::resolve) never fails: every path returns a record whose
/// `image_url` and `favicon` are non-empty. Degraded records carry a
/// [`ResolutionError`] explaining which step gave up.
#[derive(Clone)]
pub struct MetadataResolver {
    redirects: RedirectResolver,
    transport: Arc<dyn Transport>,
    fetch_timeout: Duration,
    max_redirects: usize,
}

impl MetadataResolver {
    pub fn new(
        redirects: RedirectResolver,
        transport: Arc<dyn Transport>,
        fetch_timeout: Duration,
        max_redirects: usize,
    ) -> Self {
        Self {
            redirects,
            transport,
            fetch_timeout,
            max_redirects,
        }
    }

    pub async fn resolve(&self, link: &str) -> PreviewMetadata {
        if validate_url(link).is_err() {
            tracing::debug!(link = %link, "Skipping metadata for non-http(s) link");
            return invalid_link(link);
        }

        let final_url = match self.redirects.resolve(link).await {
            ResolvedLink::Final(url) if !self.redirects.wrappers().matches_url(&url) => url,
            ResolvedLink::Final(_) => return unresolved(link, guess_source(link)),
            ResolvedLink::Unresolved { guessed_source } => {
                return unresolved(link, guessed_source.as_deref())
            }
        };

        let options = FetchOptions::get(self.fetch_timeout).max_redirects(self.max_redirects);
        match fetch_with_deadline(self.transport.as_ref(), final_url.as_str(), &options).await {
            Ok(doc) if doc.is_success() => {
                // Relative assets resolve against the page actually reached
                let page_url = validate_url(&doc.final_url).unwrap_or(final_url);
                let page = extract_page_metadata(&doc.body, &page_url);
                from_page(link, &page_url, page)
            }
            Ok(doc) => {
                tracing::warn!(url = %final_url, status = doc.status, "Metadata page returned an error status");
                fetch_failed(link, &final_url)
            }
            Err(e) => {
                tracing::warn!(url = %final_url, error = %e, "Metadata fetch failed");
                fetch_failed(link, &final_url)
            }
        }
    }
}

/// Fields scraped from one page. Absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub image: Option<String>,
    pub favicon: Option<String>,
    pub alternative_images: Vec<String>,
}

/// Scrapes Open Graph, social-card and document metadata from `html`.
///
/// Asset URLs are absolutized against `page_url`; anything that does not end
/// up as an http(s) URL is ignored.
pub fn extract_page_metadata(html: &str, page_url: &Url) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, r#"meta[property="og:title"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="twitter:title"]"#))
        .or_else(|| element_text(&document, "title"));

    let description = meta_content(&document, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="twitter:description"]"#))
        .or_else(|| meta_content(&document, r#"meta[name="description"]"#));

    let site_name = meta_content(&document, r#"meta[property="og:site_name"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="application-name"]"#));

    let image = first_asset(&document, page_url, IMAGE_SOURCES);
    let favicon = first_asset(&document, page_url, FAVICON_SOURCES)
        .or_else(|| absolutize(page_url, "/favicon.ico"));

    let mut alternative_images: Vec<String> = Vec::new();
    if let Some(img) = selector("img[src]") {
        for src in document
            .select(&img)
            .filter_map(|e| e.value().attr("src"))
            .map(str::trim)
            .filter(|src| src.len() > MIN_IMAGE_SRC_LEN)
        {
            if alternative_images.len() >= MAX_ALTERNATIVE_IMAGES {
                break;
            }
            if let Some(absolute) = absolutize(page_url, src) {
                if !alternative_images.contains(&absolute) {
                    alternative_images.push(absolute);
                }
            }
        }
    }

    PageMetadata {
        title,
        description,
        site_name,
        image,
        favicon,
        alternative_images,
    }
}

/// Image candidates as `(selector, attribute)`, in priority order.
const IMAGE_SOURCES: &[(&str, &str)] = &[
    (r#"meta[property="og:image"]"#, "content"),
    (r#"meta[name="twitter:image"]"#, "content"),
    ("article img[src]", "src"),
    ("main img[src]", "src"),
];

const FAVICON_SOURCES: &[(&str, &str)] = &[
    (r#"link[rel="icon"][href]"#, "href"),
    (r#"link[rel="shortcut icon"][href]"#, "href"),
];

/// First candidate value that absolutizes to an http(s) URL.
fn first_asset(document: &Html, page_url: &Url, sources: &[(&str, &str)]) -> Option<String> {
    sources.iter().find_map(|(css, attr)| {
        let selector = selector(css)?;
        document
            .select(&selector)
            .filter_map(|e| e.value().attr(attr))
            .filter_map(clean)
            .find_map(|raw| absolutize(page_url, &raw))
    })
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    attribute(document, css, "content")
}

fn attribute(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .filter_map(|e| e.value().attr(attr))
        .find_map(clean)
}

fn element_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    let element = document.select(&selector).next()?;
    clean(&element.text().collect::<String>())
}

fn clean(value: &str) -> Option<String> {
    let value = strip_control_chars(value).trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn absolutize(page_url: &Url, raw: &str) -> Option<String> {
    let joined = page_url.join(raw.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

fn unavailable_title(source: &str) -> String {
    format!("unavailable — {source}")
}

fn from_page(link: &str, page_url: &Url, page: PageMetadata) -> PreviewMetadata {
    let site_name = page
        .site_name
        .as_deref()
        .map(format_site_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            domain_of(page_url.as_str())
                .map(|d| format_site_name(&d))
                .unwrap_or_default()
        });
    let (image_url, image_origin) = match page.image {
        Some(image) => (image, ImageOrigin::Page),
        None => (
            source_image(&format_site_name(&site_name)).to_string(),
            ImageOrigin::Fallback,
        ),
    };
    let favicon = page
        .favicon
        .unwrap_or_else(|| source_favicon(&site_name).to_string());

    PreviewMetadata {
        source_url: page_url.to_string(),
        original_url: link.to_string(),
        title: page.title.unwrap_or_default(),
        description: page.description.unwrap_or_default(),
        site_name,
        image_url,
        image_origin,
        favicon,
        alternative_images: page.alternative_images,
        resolution_error: None,
    }
}

fn fetch_failed(link: &str, final_url: &Url) -> PreviewMetadata {
    let source = domain_of(final_url.as_str())
        .map(|d| format_site_name(&d))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    PreviewMetadata {
        source_url: final_url.to_string(),
        original_url: link.to_string(),
        title: unavailable_title(&source),
        description: format!("unable to fetch content from {final_url}"),
        image_url: source_image(&source).to_string(),
        image_origin: ImageOrigin::Fallback,
        favicon: source_favicon(&source).to_string(),
        site_name: source,
        alternative_images: Vec::new(),
        resolution_error: Some(ResolutionError::MetadataFetchFailed),
    }
}

fn unresolved(link: &str, guessed_source: Option<&str>) -> PreviewMetadata {
    let source = guessed_source
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE);

    PreviewMetadata {
        source_url: link.to_string(),
        original_url: link.to_string(),
        title: unavailable_title(source),
        description: String::new(),
        site_name: source.to_string(),
        image_url: source_image(source).to_string(),
        image_origin: ImageOrigin::Fallback,
        favicon: source_favicon(source).to_string(),
        alternative_images: Vec::new(),
        resolution_error: Some(ResolutionError::RedirectUnresolved),
    }
}

fn invalid_link(link: &str) -> PreviewMetadata {
    PreviewMetadata {
        source_url: link.to_string(),
        original_url: link.to_string(),
        title: unavailable_title(UNKNOWN_SOURCE),
        description: String::new(),
        site_name: UNKNOWN_SOURCE.to_string(),
        image_url: GENERIC_IMAGE.to_string(),
        image_origin: ImageOrigin::Fallback,
        favicon: GENERIC_FAVICON.to_string(),
        alternative_images: Vec::new(),
        resolution_error: Some(ResolutionError::InvalidUrl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{RedirectPolicy, WrapperHosts};
    use crate::transport::stub::StubTransport;
    use pretty_assertions::assert_eq;

    const ARTICLE_HTML: &str = r#"<!doctype html>
<html>
<head>
  <title>Fallback title</title>
  <meta property="og:title" content="颱風動態">
  <meta name="description" content="最新消息">
  <meta property="og:site_name" content="聯合新聞網">
  <link rel="icon" href="/static/icon.png">
</head>
<body>
  <main>
    <article>
      <img src="/img/lead-photo.jpg">
      <img src="https://cdn.udn.com/photo/2.jpg">
      <img src="a.png">
      <img src="/img/lead-photo.jpg">
    </article>
  </main>
</body>
</html>"#;

    fn resolver(stub: StubTransport) -> (MetadataResolver, Arc<StubTransport>) {
        let stub = Arc::new(stub);
        let redirects = RedirectResolver::new(
            stub.clone(),
            WrapperHosts::default(),
            RedirectPolicy::default(),
        );
        let resolver = MetadataResolver::new(redirects, stub.clone(), Duration::from_secs(10), 5);
        (resolver, stub)
    }

    fn assert_non_empty_assets(record: &PreviewMetadata) {
        assert!(!record.image_url.is_empty());
        assert!(!record.favicon.is_empty());
    }

    #[test]
    fn test_extract_prefers_open_graph_and_absolutizes() {
        let page_url = Url::parse("https://udn.com/news/story/1").unwrap();
        let page = extract_page_metadata(ARTICLE_HTML, &page_url);

        assert_eq!(page.title.as_deref(), Some("颱風動態"));
        assert_eq!(page.description.as_deref(), Some("最新消息"));
        assert_eq!(page.site_name.as_deref(), Some("聯合新聞網"));
        assert_eq!(page.image.as_deref(), Some("https://udn.com/img/lead-photo.jpg"));
        assert_eq!(page.favicon.as_deref(), Some("https://udn.com/static/icon.png"));
        assert_eq!(
            page.alternative_images,
            vec![
                "https://udn.com/img/lead-photo.jpg".to_string(),
                "https://cdn.udn.com/photo/2.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_falls_back_to_document_title_and_origin_favicon() {
        let page_url = Url::parse("https://www.setn.com/News.aspx?id=1").unwrap();
        let page = extract_page_metadata(
            "<html><head><title> 三立新聞 </title></head><body></body></html>",
            &page_url,
        );

        assert_eq!(page.title.as_deref(), Some("三立新聞"));
        assert_eq!(page.image, None);
        assert_eq!(page.favicon.as_deref(), Some("https://www.setn.com/favicon.ico"));
        assert!(page.alternative_images.is_empty());
    }

    #[test]
    fn test_non_http_image_falls_through_to_next_candidate() {
        let html = r#"<html><head>
            <meta property="og:image" content="data:image/png;base64,iVBORw0KGgo=">
            <meta name="twitter:image" content="/img/card.jpg">
            <link rel="icon" href="javascript:void(0)">
            <link rel="shortcut icon" href="/shortcut.ico">
        </head></html>"#;
        let page_url = Url::parse("https://example.com/news/1").unwrap();
        let page = extract_page_metadata(html, &page_url);

        assert_eq!(page.image.as_deref(), Some("https://example.com/img/card.jpg"));
        assert_eq!(page.favicon.as_deref(), Some("https://example.com/shortcut.ico"));
    }

    #[test]
    fn test_extract_caps_alternative_images() {
        let body: String = (0..8)
            .map(|i| format!(r#"<img src="https://img.example.com/photo-{i}.jpg">"#))
            .collect();
        let page_url = Url::parse("https://example.com/").unwrap();
        let page = extract_page_metadata(&format!("<html><body>{body}</body></html>"), &page_url);
        assert_eq!(page.alternative_images.len(), MAX_ALTERNATIVE_IMAGES);
    }

    #[tokio::test]
    async fn test_resolved_page_builds_full_record() {
        let link = "https://udn.com/news/story/1";
        let (resolver, _) = resolver(StubTransport::default().page(link, ARTICLE_HTML));

        let record = resolver.resolve(link).await;

        assert_eq!(record.title, "颱風動態");
        assert_eq!(record.site_name, "聯合新聞網");
        assert_eq!(record.image_origin, ImageOrigin::Page);
        assert_eq!(record.resolution_error, None);
        assert_eq!(record.original_url, link);
        assert_non_empty_assets(&record);
    }

    #[tokio::test]
    async fn test_declared_site_name_is_formatted() {
        let link = "https://news.tvbs.com.tw/world/1";
        let html = r#"<html><head><meta property="og:site_name" content="tvbs"></head></html>"#;
        let (resolver, _) = resolver(StubTransport::default().page(link, html));

        let record = resolver.resolve(link).await;

        assert_eq!(record.site_name, "TVBS新聞網");
        assert_eq!(record.image_url, source_image("TVBS新聞網"));
        assert_eq!(record.image_origin, ImageOrigin::Fallback);
    }

    #[tokio::test]
    async fn test_page_without_image_uses_branded_fallback() {
        let link = "https://www.cna.com.tw/news/aipl/1.aspx";
        let (resolver, _) =
            resolver(StubTransport::default().page(link, "<html><head><title>t</title></head></html>"));

        let record = resolver.resolve(link).await;

        assert_eq!(record.site_name, "中央社");
        assert_eq!(record.image_url, source_image("中央社"));
        assert_eq!(record.image_origin, ImageOrigin::Fallback);
    }

    #[tokio::test]
    async fn test_unresolved_wrapper_uses_guessed_publisher_assets() {
        let link = "https://news.google.com/rss/articles/CBMi?url=udn.com/news/9";
        let (resolver, stub) = resolver(StubTransport::default().failing(link));

        let record = resolver.resolve(link).await;

        assert_eq!(record.site_name, "聯合新聞網");
        assert_eq!(record.title, "unavailable — 聯合新聞網");
        assert_eq!(record.image_url, source_image("聯合新聞網"));
        assert_ne!(record.image_url, GENERIC_IMAGE);
        assert_eq!(record.resolution_error, Some(ResolutionError::RedirectUnresolved));
        // No page fetch after the failed unwrap
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_timeout_degrades_to_fallback_record() {
        let link = "https://www.ettoday.net/news/20240101/1.htm";
        let (resolver, _) = resolver(StubTransport::default().hanging(link));

        let record = resolver.resolve(link).await;

        assert_eq!(record.resolution_error, Some(ResolutionError::MetadataFetchFailed));
        assert!(record.title.starts_with("unavailable — "));
        assert_eq!(record.site_name, "ETtoday");
        assert_eq!(
            record.description,
            "unable to fetch content from https://www.ettoday.net/news/20240101/1.htm"
        );
        assert_non_empty_assets(&record);
    }

    #[tokio::test]
    async fn test_error_status_counts_as_fetch_failure() {
        let link = "https://blog.example.org/post";
        let (resolver, _) = resolver(StubTransport::default().status(link, 404));

        let record = resolver.resolve(link).await;

        assert_eq!(record.resolution_error, Some(ResolutionError::MetadataFetchFailed));
        assert_eq!(record.site_name, "Blog.example.org");
        assert_eq!(record.image_url, GENERIC_IMAGE);
        assert_eq!(record.favicon, GENERIC_FAVICON);
    }

    #[tokio::test]
    async fn test_invalid_link_skips_network() {
        let (resolver, stub) = resolver(StubTransport::default());

        let record = resolver.resolve("javascript:void(0)").await;

        assert_eq!(record.resolution_error, Some(ResolutionError::InvalidUrl));
        assert_eq!(record.image_url, GENERIC_IMAGE);
        assert_eq!(record.favicon, GENERIC_FAVICON);
        assert!(stub.calls().is_empty());
    }
}
