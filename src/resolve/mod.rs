//! Link unwrapping and preview metadata.
//!
//! - [`RedirectResolver`] turns an item link into a [`ResolvedLink`](crate::types::ResolvedLink),
//!   unwrapping aggregator indirection links ([`WrapperHosts`]).
//! - [`MetadataResolver`] scrapes the destination page for a
//!   [`PreviewMetadata`](crate::types::PreviewMetadata) record, falling back to
//!   publisher-branded assets when the page cannot be reached.
//! - The publisher tables ([`format_site_name`], [`guess_source`],
//!   [`source_image`], [`source_favicon`]) are total lookups shared by both.

mod metadata;
mod redirect;
mod sources;

pub use metadata::{extract_page_metadata, MetadataResolver, PageMetadata};
pub use redirect::{RedirectPolicy, RedirectResolver, WrapperHosts};
pub use sources::{
    domain_of, format_site_name, guess_source, source_favicon, source_image, GENERIC_FAVICON,
    GENERIC_IMAGE, UNKNOWN_SOURCE,
};
