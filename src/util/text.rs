use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use unicode_width::UnicodeWidthChar;

/// Ellipsis appended when a title is cut for display
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

static TAG_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn tag_pattern() -> Option<&'static Regex> {
    TAG_PATTERN
        .get_or_init(|| Regex::new(r"<[^>]*>").ok())
        .as_ref()
}

/// Truncates a string to fit within a maximum display width.
///
/// Width is measured in terminal columns, so CJK headlines (two columns per
/// character) are cut at the right place. When truncation happens, "..." is
/// appended and counted against `max_width`. Widths of 3 or less return as
/// many characters as fit, without an ellipsis.
///
/// ```
/// use newsreel::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("你好世界", 7), "你好...");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    if max_width <= ELLIPSIS_WIDTH {
        let mut byte_end = 0;
        let mut current_width = 0;
        for (idx, c) in s.char_indices() {
            let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
            if current_width + char_width > max_width {
                break;
            }
            current_width += char_width;
            byte_end = idx + c.len_utf8();
        }
        if byte_end == s.len() {
            return Cow::Borrowed(s);
        }
        return Cow::Owned(s[..byte_end].to_string());
    }

    let target_width = max_width - ELLIPSIS_WIDTH;
    let mut current_width = 0;
    let mut cut_point = None;

    for (idx, c) in s.char_indices() {
        let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
        if cut_point.is_none() && current_width + char_width > target_width {
            cut_point = Some(idx);
        }
        if current_width + char_width > max_width {
            let cut = cut_point.unwrap_or(idx);
            return Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS));
        }
        current_width += char_width;
    }

    Cow::Borrowed(s)
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences.
///
/// Feed titles and scraped page text are attacker-controlled and end up
/// printed by the CLI. Tab, newline and carriage return are preserved.
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    fn is_control(b: u8) -> bool {
        b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
    }

    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        if b == 0x1b && i + 1 < len && bytes[i + 1] == b'[' {
            // CSI: parameters until a final byte in 0x40..=0x7e
            i += 2;
            while i < len {
                let c = bytes[i];
                i += 1;
                if (0x40..=0x7e).contains(&c) {
                    break;
                }
            }
        } else if b == 0x1b && i + 1 < len && bytes[i + 1] == b']' {
            // OSC: until BEL or ST
            i += 2;
            while i < len {
                if bytes[i] == 0x07 {
                    i += 1;
                    break;
                }
                if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                    i += 2;
                    break;
                }
                i += 1;
            }
        } else if is_control(b) {
            i += 1;
        } else {
            let start = i;
            while i < len && !is_control(bytes[i]) {
                i += 1;
            }
            // Only ASCII control bytes end the run, so this slice is on char boundaries
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

/// Decodes the handful of HTML entities that show up in feed text.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace("&nbsp;", " ")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

/// Removes markup from an HTML fragment and returns clean, trimmed text.
///
/// ```
/// use newsreel::util::strip_html;
///
/// assert_eq!(strip_html("<p>Rain <b>today</b></p>&nbsp;"), "Rain today");
/// ```
pub fn strip_html(html: &str) -> String {
    let without_tags = match tag_pattern() {
        Some(re) => re.replace_all(html, ""),
        None => Cow::Borrowed(html),
    };
    let decoded = decode_entities(&without_tags);
    strip_control_chars(&decoded).trim().to_string()
}
