//! Publisher naming and branded fallback assets.
//!
//! All lookups are total: unknown input maps to a generic default, never to
//! an error or an empty string (except `format_site_name("")`).

use url::Url;

/// Placeholder image used when no publisher-specific one is known.
pub const GENERIC_IMAGE: &str = "https://via.placeholder.com/300x150/CCCCCC/969696?text=News";
/// Favicon used when no publisher-specific one is known.
pub const GENERIC_FAVICON: &str = "https://www.google.com/favicon.ico";
/// Display name for a publisher we could not identify.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// URL fragments that identify a publisher inside a wrapper link.
/// Checked in order; more specific fragments come first.
const URL_FRAGMENTS: &[(&str, &str)] = &[
    ("money.udn.com", "經濟日報"),
    ("udn.com", "聯合新聞網"),
    ("ltn.com.tw", "自由時報電子報"),
    ("cna.com.tw", "中央社"),
    ("ettoday.net", "ETtoday"),
    ("yahoo.com", "Yahoo奇摩新聞"),
    ("nownews.com", "NOWnews"),
    ("storm.mg", "風傳媒"),
    ("tvbs.com.tw", "TVBS新聞網"),
    ("ebc.net.tw", "東森新聞"),
    ("setn.com", "三立新聞網"),
    ("ctee.com.tw", "工商時報"),
    ("newtalk.tw", "Newtalk新聞"),
    ("pts.org.tw", "公視新聞網"),
    ("appledaily.com", "蘋果日報"),
    ("chinatimes.com", "中時新聞網"),
];

/// Site-name keys matched as substrings of a lowercased name or domain.
const SITE_NAME_KEYS: &[(&str, &str)] = &[
    ("money.udn", "經濟日報"),
    ("udn", "聯合新聞網"),
    ("ltn", "自由時報電子報"),
    ("cna", "中央社"),
    ("ettoday", "ETtoday"),
    ("yahoo", "Yahoo奇摩新聞"),
    ("nownews", "NOWnews"),
    ("storm", "風傳媒"),
    ("tvbs", "TVBS新聞網"),
    ("ebc", "東森新聞"),
    ("setn", "三立新聞網"),
    ("ctee", "工商時報"),
    ("newtalk", "Newtalk新聞"),
    ("pts.org", "公視新聞網"),
    ("appledaily", "蘋果日報"),
    ("chinatimes", "中時新聞網"),
];

const SOURCE_IMAGES: &[(&str, &str)] = &[
    ("中央社", "https://i.imgur.com/B0DVO26.png"),
    ("聯合新聞網", "https://i.imgur.com/nPcZ5DO.png"),
    ("自由時報電子報", "https://i.imgur.com/qrTCSHq.png"),
    ("ETtoday", "https://i.imgur.com/XRMyrIW.png"),
    ("Yahoo奇摩新聞", "https://i.imgur.com/tplNlvx.png"),
    ("Yahoo奇摩運動", "https://i.imgur.com/tplNlvx.png"),
    ("NOWnews", "https://i.imgur.com/uYgW0Fv.png"),
    ("風傳媒", "https://i.imgur.com/bWMaqpz.png"),
    ("TVBS新聞網", "https://i.imgur.com/nzBlfHQ.png"),
    ("東森新聞", "https://i.imgur.com/xfuXDwn.png"),
    ("三立新聞網", "https://i.imgur.com/N5auR5a.png"),
    ("經濟日報", "https://i.imgur.com/rTIQPNj.png"),
    ("工商時報", "https://i.imgur.com/pvtKilg.png"),
    ("新頭殼", "https://i.imgur.com/pKGHKdg.png"),
    ("運動視界", "https://i.imgur.com/JqcIKLG.png"),
    ("蘋果日報", "https://i.imgur.com/Pdda1Mc.png"),
    ("公視新聞網", "https://news.pts.org.tw/assets/img/logo/logo-dark.svg"),
    ("民報", "https://www.peoplenews.tw/images/logo.png"),
    ("台灣好新聞", "https://www.taiwanhot.net/wp-content/themes/Newspaper-child/images/logo.png"),
    ("Newtalk新聞", "https://newtalk.tw/logo.png"),
    ("中時新聞網", "https://images.chinatimes.com/logo/logo_chinatimes_new.svg"),
];

const SOURCE_FAVICONS: &[(&str, &str)] = &[
    ("中央社", "https://www.cna.com.tw/favicon.ico"),
    ("聯合新聞網", "https://udn.com/favicon.ico"),
    ("自由時報電子報", "https://www.ltn.com.tw/favicon.ico"),
    ("ETtoday", "https://www.ettoday.net/favicon.ico"),
    ("Yahoo奇摩新聞", "https://s.yimg.com/cv/apiv2/social/images/yahoo_default_logo.png"),
    ("NOWnews", "https://www.nownews.com/favicon.ico"),
    ("風傳媒", "https://www.storm.mg/favicon.ico"),
    ("TVBS新聞網", "https://news.tvbs.com.tw/favicon.ico"),
    ("東森新聞", "https://news.ebc.net.tw/favicon.ico"),
    ("三立新聞網", "https://www.setn.com/favicon.ico"),
    ("經濟日報", "https://money.udn.com/favicon.ico"),
    ("工商時報", "https://ctee.com.tw/favicon.ico"),
    ("新頭殼", "https://newtalk.tw/favicon.ico"),
    ("蘋果日報", "https://www.appledaily.com.tw/favicon.ico"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Guesses the publisher from the text of a link that could not be unwrapped.
pub fn guess_source(url: &str) -> Option<&'static str> {
    let lowered = url.to_lowercase();
    URL_FRAGMENTS
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
        .map(|(_, name)| *name)
}

/// Turns a site name or bare domain into the display name readers know.
///
/// ```
/// use newsreel::resolve::format_site_name;
///
/// assert_eq!(format_site_name("udn.com"), "聯合新聞網");
/// assert_eq!(format_site_name("example.org"), "Example.org");
/// assert_eq!(format_site_name(""), "");
/// ```
pub fn format_site_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return String::new();
    }

    let lowered = name.to_lowercase();
    if let Some((_, display)) = SITE_NAME_KEYS.iter().find(|(key, _)| lowered.contains(key)) {
        return (*display).to_string();
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Host of `url` without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Branded placeholder for a formatted source name, or the generic one.
pub fn source_image(source: &str) -> &'static str {
    if source.is_empty() || source == UNKNOWN_SOURCE {
        return GENERIC_IMAGE;
    }
    lookup(SOURCE_IMAGES, source).unwrap_or(GENERIC_IMAGE)
}

/// Favicon for a source name; domain-shaped input is formatted first.
pub fn source_favicon(source: &str) -> &'static str {
    if source.is_empty() {
        return GENERIC_FAVICON;
    }
    let formatted;
    let source = if source.contains('.') {
        formatted = format_site_name(source);
        formatted.as_str()
    } else {
        source
    };
    lookup(SOURCE_FAVICONS, source).unwrap_or(GENERIC_FAVICON)
}
