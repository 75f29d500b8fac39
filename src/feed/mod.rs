//! Podcast feed resolution.
//!
//! Given a URL a listener might paste (a show's homepage, an episode page, a
//! catalog listing, or the feed itself), work out which RSS feeds carry the
//! podcast:
//!
//! - **Catalog**: Apple catalog URLs are answered by the public lookup API
//! - **Classification**: A response counts as a podcast feed only if it is an
//!   RSS document with at least one `audio/mpeg` enclosure
//! - **Extraction**: HTML pages are scanned for catalog links, typed `<link>`
//!   tags and, as a last resort, a window of their anchors
//!
//! # Architecture
//!
//! - [`fetcher`] - Shared HTTP client, deadline handling, capped body reads
//! - [`sanitize`] - Streaming filter dropping characters XML forbids
//! - [`classify`] - Feed predicates for responses, URLs and raw documents
//! - [`itunes`] - Catalog ID extraction and lookup API client
//! - [`extract`] - HTML candidate scanning and ordered validation
//! - [`discovery`] - [`PodcastResolver`], tying the above together
//!
//! # Example
//!
//! ```no_run
//! use podlink::{Config, PodcastResolver};
//! use url::Url;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = PodcastResolver::from_config(&Config::default())?;
//! let page = Url::parse("https://example.com/my-show")?;
//! for feed in resolver.resolve(&page).await? {
//!     println!("{feed}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod discovery;
pub mod extract;
pub mod fetcher;
pub mod itunes;
pub mod sanitize;

pub use classify::{
    is_feed_media_type, is_feed_response, is_feed_url, is_podcast_document, Precheck,
    AUDIO_ENCLOSURE_TYPE, FEED_MIME_TYPES,
};
pub use discovery::{PodcastResolver, ResolveError};
pub use extract::{dedup_urls, find_feed_urls, scan_html, PageCandidates, ANCHOR_WINDOW};
pub use fetcher::{
    media_type, shared_client, Deadline, FetchError, Fetcher, DEFAULT_MAX_BODY_BYTES, USER_AGENT,
};
pub use itunes::{catalog_id, CatalogId, ItunesCatalog, CATALOG_DOMAIN, LOOKUP_ENDPOINT};
pub use sanitize::{sanitize_xml, CharStream, StrStream, XmlCharFilter};
