//! Utility functions shared by the parser, resolvers and CLI.
//!
//! - **URL validation**: what counts as a fetchable link, plus the SSRF host check
//! - **Text processing**: markup stripping, entity decoding, control-char
//!   removal and width-aware truncation
//!
//! # Examples
//!
//! ```
//! use newsreel::util::{strip_html, truncate_to_width, validate_url};
//!
//! let url = validate_url("https://www.cna.com.tw/news/1.aspx").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! let text = strip_html("<p>Hello</p>");
//! assert_eq!(truncate_to_width(&text, 3), "Hel");
//! ```

mod text;
mod url_validator;

pub use text::{decode_entities, strip_control_chars, strip_html, truncate_to_width};
pub use url_validator::{is_private_host, validate_url, UrlValidationError};
