use std::sync::OnceLock;

use feed_rs::model::Entry;
use feed_rs::parser;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::resolve::{domain_of, format_site_name};
use crate::types::NewsItem;
use crate::util::{decode_entities, strip_control_chars, strip_html};

/// A feed document that is not well-formed XML, or not a feed at all.
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("Malformed feed{}: {reason}", describe_title(.feed_title))]
    Malformed {
        /// Channel or feed title, when it was read before the error
        feed_title: Option<String>,
        reason: String,
    },
}

fn describe_title(title: &Option<String>) -> String {
    title
        .as_deref()
        .map(|t| format!(" '{t}'"))
        .unwrap_or_default()
}

/// Items parsed from one document, plus the number of entries dropped for
/// missing a title or link.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub items: Vec<NewsItem>,
    pub skipped: usize,
}

/// Parses an RSS 2.0 or Atom document into items, in document order.
///
/// Empty input is an empty result. Entries without a title or link are
/// skipped and counted. Any XML error, a document that ends with open
/// elements, or a root that is not a feed is [`FeedParseError::Malformed`].
/// Items leave `category` unset.
pub fn parse_feed(text: &str) -> Result<ParseResult, FeedParseError> {
    if text.trim().is_empty() {
        return Ok(ParseResult::default());
    }

    let feed_title = check_well_formed(text)?;
    let feed = parser::parse(text.as_bytes()).map_err(|e| FeedParseError::Malformed {
        feed_title: feed_title.clone(),
        reason: e.to_string(),
    })?;

    let mut result = ParseResult::default();
    for entry in &feed.entries {
        match to_item(entry) {
            Some(item) => result.items.push(item),
            None => {
                result.skipped += 1;
                tracing::debug!(
                    feed = feed_title.as_deref().unwrap_or("untitled"),
                    entry = %entry.id,
                    "Skipping entry without title or link"
                );
            }
        }
    }
    Ok(result)
}

/// Walks the document once to reject truncated or mismatched markup, which
/// `feed-rs` tolerates, and to pick up the feed title for error reports.
fn check_well_formed(text: &str) -> Result<Option<String>, FeedParseError> {
    // SEC-002: quick-xml (0.37) never expands DOCTYPE entity declarations; the title
    // falls back to the small HTML entity table in `decode_entities`.
    let mut reader = Reader::from_str(text);
    let mut open: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut feed_title: Option<String> = None;

    let malformed = |feed_title: &Option<String>, reason: String| FeedParseError::Malformed {
        feed_title: feed_title.clone(),
        reason,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_root = true;
                open.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Empty(_)) => saw_root = true,
            Ok(Event::End(_)) => {
                if open.pop().is_none() {
                    return Err(malformed(&feed_title, "closing tag without a matching start".into()));
                }
            }
            Ok(Event::Text(t)) if feed_title.is_none() && is_feed_title(&open) => {
                let raw = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => decode_entities(&String::from_utf8_lossy(&t)).into_owned(),
                };
                let title = strip_control_chars(raw.trim()).into_owned();
                feed_title = (!title.is_empty()).then_some(title);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(&feed_title, e.to_string())),
            _ => {}
        }
    }

    if let Some(name) = open.last() {
        return Err(malformed(&feed_title, format!("document ends inside <{name}>")));
    }
    if !saw_root {
        return Err(malformed(&feed_title, "no root element".into()));
    }
    Ok(feed_title)
}

fn is_feed_title(open: &[String]) -> bool {
    match open {
        [.., parent, last] => last == "title" && matches!(parent.as_str(), "channel" | "feed"),
        _ => false,
    }
}

fn to_item(entry: &Entry) -> Option<NewsItem> {
    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty())?;
    let link = entry_link(entry)?;

    let image_url = IMAGE_STRATEGIES.iter().find_map(|extract| extract(entry));
    let source_name = SOURCE_STRATEGIES
        .iter()
        .find_map(|extract| extract(entry))
        .or_else(|| source_from_title(&title));

    Some(NewsItem {
        published_at: entry.published.or(entry.updated),
        description: raw_bodies(entry).next().map(strip_html).unwrap_or_default(),
        image_url,
        category: None,
        source_name,
        title,
        link,
    })
}

/// Prefers a plain or `alternate` link, then any link at all.
fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .filter(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .chain(entry.links.iter())
        .map(|l| strip_control_chars(l.href.trim()).into_owned())
        .find(|href| !href.is_empty())
}

/// Summary first, then full content; both as raw markup.
fn raw_bodies(entry: &Entry) -> impl Iterator<Item = &str> {
    entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .into_iter()
        .chain(entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .filter(|body| !body.trim().is_empty())
}

type Extractor = fn(&Entry) -> Option<String>;

/// Image sources in priority order.
const IMAGE_STRATEGIES: &[Extractor] = &[media_thumbnail, media_image, enclosure_link, inline_image];

/// Explicit publisher fields in priority order; the title heuristics run last.
const SOURCE_STRATEGIES: &[Extractor] = &[source_element, first_author];

fn media_thumbnail(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .flat_map(|m| &m.thumbnails)
        .map(|t| t.image.uri.trim())
        .find(|uri| !uri.is_empty())
        .map(str::to_string)
}

/// `media:content` and RSS enclosures. Untyped media counts as an image.
fn media_image(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .flat_map(|m| &m.content)
        .filter(|c| {
            c.content_type
                .as_ref()
                .map_or(true, |t| t.essence().to_string().starts_with("image/"))
        })
        .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
}

/// Atom `<link rel="enclosure">` with an image type.
fn enclosure_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .filter(|l| l.media_type.as_deref().is_some_and(|t| t.starts_with("image/")))
        .map(|l| l.href.trim())
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

fn inline_image(entry: &Entry) -> Option<String> {
    let pattern = inline_image_pattern()?;
    raw_bodies(entry).find_map(|body| {
        pattern
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|src| !src.is_empty())
    })
}

fn inline_image_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i)<img[^>]+src=['"]([^'">]+)['"]"#).ok())
        .as_ref()
}

/// The entry's `<source>`: a publisher name, or a link whose domain names it.
fn source_element(entry: &Entry) -> Option<String> {
    let source = entry.source.as_deref()?.trim();
    match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            domain_of(url.as_str()).map(|d| format_site_name(&d))
        }
        Ok(_) => None,
        Err(_) => clean_source(source),
    }
}

/// Authors cover RSS `<author>`, `dc:creator` and Atom `<author><name>`.
fn first_author(entry: &Entry) -> Option<String> {
    entry.authors.iter().find_map(|p| clean_source(&p.name))
}

fn clean_source(value: &str) -> Option<String> {
    let value = strip_html(value);
    (!value.is_empty()).then_some(value)
}

/// Publisher markers commonly prefixed to headlines, first match wins.
const TITLE_SOURCE_PATTERNS: &[&str] = &[
    r"^【([^】]+)】",
    r"^「([^」]+)」",
    r"^［([^］]+)］",
    r"^\[([^\]]+)\]",
    r"^(.+?)[:：]\s*",
    r"^(\S+?報導)[,，]?",
    r"^(\S+?編輯報導)[,，]?",
];

fn title_source_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TITLE_SOURCE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Guesses the publisher from a headline such as `【中央社】...` or `TVBS：...`.
pub fn source_from_title(title: &str) -> Option<String> {
    title_source_patterns().iter().find_map(|pattern| {
        pattern
            .captures(title)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const YAHOO_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Yahoo奇摩新聞 - 科技</title>
  <link>https://tw.news.yahoo.com/</link>
  <description>科技新聞</description>
  <item>
    <title>【中央社】晶片出口創新高</title>
    <link>https://tw.news.yahoo.com/chip-1.html</link>
    <pubDate>Tue, 02 Jan 2024 08:30:00 +0800</pubDate>
    <description><![CDATA[<p><img src="https://s.yimg.com/inline.jpg" alt="">出口&nbsp;成長</p>]]></description>
    <media:content url="https://s.yimg.com/media.jpg" type="image/jpeg"/>
    <source url="https://www.cna.com.tw/">中央社</source>
  </item>
  <item>
    <title>TVBS：颱風假最新消息</title>
    <link>https://tw.news.yahoo.com/typhoon-2.html</link>
    <enclosure url="https://s.yimg.com/audio.mp3" type="audio/mpeg" length="1"/>
    <enclosure url="https://s.yimg.com/enclosure.png" type="image/png" length="1"/>
  </item>
  <item>
    <title>沒有圖片的新聞</title>
    <link>https://tw.news.yahoo.com/plain-3.html</link>
    <description>&lt;b&gt;純文字&lt;/b&gt; 內容</description>
    <dc:creator>記者王小明</dc:creator>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_rss_items_in_document_order() {
        let result = parse_feed(YAHOO_RSS).unwrap();
        let titles: Vec<_> = result.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["【中央社】晶片出口創新高", "TVBS：颱風假最新消息", "沒有圖片的新聞"]
        );
        assert_eq!(result.skipped, 0);
        assert!(result.items.iter().all(|i| i.category.is_none()));
    }

    #[test]
    fn test_media_content_wins_over_inline_image() {
        let result = parse_feed(YAHOO_RSS).unwrap();
        let first = &result.items[0];
        assert_eq!(first.image_url.as_deref(), Some("https://s.yimg.com/media.jpg"));
        assert_eq!(first.source_name.as_deref(), Some("中央社"));
        assert_eq!(first.description, "出口 成長");
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_enclosure_requires_image_type() {
        let result = parse_feed(YAHOO_RSS).unwrap();
        let second = &result.items[1];
        assert_eq!(second.image_url.as_deref(), Some("https://s.yimg.com/enclosure.png"));
        // No explicit source element: falls back to the headline prefix
        assert_eq!(second.source_name.as_deref(), Some("TVBS"));
        assert_eq!(second.published_at, None);
    }

    #[test]
    fn test_escaped_description_is_stripped_and_creator_used() {
        let result = parse_feed(YAHOO_RSS).unwrap();
        let third = &result.items[2];
        assert_eq!(third.description, "純文字 內容");
        assert_eq!(third.image_url, None);
        assert_eq!(third.source_name.as_deref(), Some("記者王小明"));
    }

    #[test]
    fn test_inline_image_from_content_encoded() {
        let rss = r#"<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel>
            <title>x</title>
            <item>
              <title>t</title><link>https://example.com/a</link>
              <description>no picture here</description>
              <content:encoded><![CDATA[<figure><IMG class="x" SRC='https://cdn.example.com/p.jpg'></figure>]]></content:encoded>
            </item>
        </channel></rss>"#;
        let result = parse_feed(rss).unwrap();
        assert_eq!(result.items[0].description, "no picture here");
        assert_eq!(
            result.items[0].image_url.as_deref(),
            Some("https://cdn.example.com/p.jpg")
        );
    }

    #[test]
    fn test_parse_atom_prefers_alternate_href() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/">
  <title>Example Atom</title>
  <id>urn:example:feed</id>
  <updated>2024-03-05T10:00:00Z</updated>
  <entry>
    <title type="html">Hello &amp;amp; welcome</title>
    <id>urn:example:1</id>
    <link rel="enclosure" type="audio/mpeg" href="https://example.com/audio.mp3"/>
    <link rel="alternate" href="https://example.com/posts/1"/>
    <published>2024-03-05T10:00:00Z</published>
    <updated>2024-03-06T10:00:00Z</updated>
    <author><name>Jane Reporter</name><email>jane@example.com</email></author>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;&lt;img src="https://example.com/pic.png"/&gt;</content>
    <media:thumbnail url="https://example.com/thumb.jpg"/>
  </entry>
</feed>"#;
        let result = parse_feed(atom).unwrap();
        let entry = &result.items[0];

        assert_eq!(entry.title, "Hello & welcome");
        assert_eq!(entry.link, "https://example.com/posts/1");
        assert_eq!(entry.source_name.as_deref(), Some("Jane Reporter"));
        assert_eq!(entry.image_url.as_deref(), Some("https://example.com/thumb.jpg"));
        assert_eq!(entry.description, "Body");
        assert_eq!(
            entry.published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_atom_html_content_inline_image() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title><id>urn:f</id><entry>
            <title>t</title><id>urn:2</id><link href="https://example.com/2"/>
            <content type="html">&lt;div&gt;&lt;img src="https://example.com/nested.png"&gt;&lt;/div&gt;</content>
        </entry></feed>"#;
        let result = parse_feed(atom).unwrap();
        assert_eq!(
            result.items[0].image_url.as_deref(),
            Some("https://example.com/nested.png")
        );
    }

    #[test]
    fn test_atom_source_with_children_yields_plain_name() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title><id>urn:f</id><entry>
            <title>Example Wire: Storm reaches coast</title><id>urn:3</id>
            <link href="https://example.com/3"/>
            <source><title>Example Wire</title><id>urn:x</id></source>
        </entry></feed>"#;
        let result = parse_feed(atom).unwrap();
        assert_eq!(result.items[0].source_name.as_deref(), Some("Example Wire"));
    }

    #[test]
    fn test_source_markup_is_stripped() {
        let rss = r#"<rss version="2.0"><channel><title>x</title>
            <item><title>t</title><link>https://example.com/4</link>
            <author>&lt;b&gt;Desk&lt;/b&gt; Reporter</author></item>
        </channel></rss>"#;
        let result = parse_feed(rss).unwrap();
        assert_eq!(result.items[0].source_name.as_deref(), Some("Desk Reporter"));
    }

    #[test]
    fn test_entries_missing_title_or_link_are_skipped() {
        let rss = r#"<rss version="2.0"><channel><title>x</title>
            <item><title>kept</title><link>https://example.com/1</link></item>
            <item><title>no link</title></item>
            <item><link>https://example.com/no-title</link></item>
            <item><title>   </title><link>https://example.com/blank</link></item>
        </channel></rss>"#;
        let result = parse_feed(rss).unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.skipped, 3);
    }

    #[test]
    fn test_empty_input_is_not_an_error() {
        assert!(parse_feed("").unwrap().items.is_empty());
        assert!(parse_feed("  \n\t ").unwrap().items.is_empty());
    }

    #[test]
    fn test_channel_without_items_is_empty() {
        let result = parse_feed(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#)
            .unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_mismatched_tags_report_feed_title() {
        let broken = r#"<rss><channel><title>體育新聞</title><item><title>x</item></channel></rss>"#;
        match parse_feed(broken) {
            Err(FeedParseError::Malformed { feed_title, .. }) => {
                assert_eq!(feed_title.as_deref(), Some("體育新聞"));
            }
            Ok(r) => panic!("expected malformed, got {} items", r.items.len()),
        }
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let truncated = r#"<rss><channel><item><title>x</title><link>https://e.com</link></item>"#;
        assert!(matches!(
            parse_feed(truncated),
            Err(FeedParseError::Malformed { .. })
        ));
        assert!(parse_feed("<not valid xml").is_err());
        assert!(parse_feed("just some text").is_err());
    }

    #[test]
    fn test_non_feed_root_is_malformed() {
        let html = "<html><head><title>Not a feed</title></head><body></body></html>";
        assert!(matches!(parse_feed(html), Err(FeedParseError::Malformed { .. })));
    }

    #[test]
    fn test_control_characters_removed_from_titles() {
        let rss = "<rss version=\"2.0\"><channel><title>x</title><item><title>Breaking\u{1b}[31m news</title><link>https://example.com/x</link></item></channel></rss>";
        let result = parse_feed(rss).unwrap();
        assert_eq!(result.items[0].title, "Breaking news");
    }

    #[test]
    fn test_source_from_title_patterns() {
        assert_eq!(source_from_title("【中央社】新聞").as_deref(), Some("中央社"));
        assert_eq!(source_from_title("「聯合報」頭版").as_deref(), Some("聯合報"));
        assert_eq!(source_from_title("［民視］快訊").as_deref(), Some("民視"));
        assert_eq!(source_from_title("[Reuters] Markets rally").as_deref(), Some("Reuters"));
        assert_eq!(source_from_title("ETtoday：颱風來襲").as_deref(), Some("ETtoday"));
        assert_eq!(source_from_title("中央社記者台北報導，今天").as_deref(), Some("中央社記者台北報導"));
        assert_eq!(source_from_title("沒有來源的標題"), None);
    }
}
