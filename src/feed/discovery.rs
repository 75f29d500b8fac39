use crate::config::Config;
use crate::feed::classify::is_feed_response;
use crate::feed::extract::{dedup_urls, find_feed_urls, scan_html};
use crate::feed::fetcher::{media_type, shared_client, Deadline, FetchError, Fetcher};
use crate::feed::itunes::{catalog_id, ItunesCatalog};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const HTML_MEDIA_TYPE: &str = "text/html";

/// Errors that abort a resolution.
///
/// "No feed found" is not among them; that is an empty result.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The shared HTTP client could not be built
    #[error("HTTP client unavailable: {0}")]
    Client(#[source] FetchError),
    /// The configured catalog lookup endpoint is not an absolute URL
    #[error("invalid catalog lookup endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    /// The input URL itself could not be fetched
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: Url,
        #[source]
        source: FetchError,
    },
}

/// Resolves a podcast page, feed, or catalog URL to the feed URLs it stands for.
///
/// Cheap to clone; clones share the process-wide HTTP client.
#[derive(Debug, Clone)]
pub struct PodcastResolver {
    fetcher: Fetcher,
    catalog: ItunesCatalog,
    timeout: Duration,
}

impl PodcastResolver {
    pub fn new(fetcher: Fetcher, catalog: ItunesCatalog, timeout: Duration) -> Self {
        Self {
            fetcher,
            catalog,
            timeout,
        }
    }

    /// Builds a resolver on top of the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Client`] if the HTTP client cannot be built or
    /// [`ResolveError::InvalidEndpoint`] if the lookup URL does not parse.
    pub fn from_config(config: &Config) -> Result<Self, ResolveError> {
        let client = shared_client().map_err(ResolveError::Client)?;
        let endpoint = Url::parse(&config.itunes_lookup_url)?;
        Ok(Self::new(
            Fetcher::new(client, config.max_body_bytes),
            ItunesCatalog::new(endpoint),
            config.timeout(),
        ))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves `url` under a fresh deadline of [`PodcastResolver::timeout`].
    ///
    /// # Errors
    ///
    /// See [`PodcastResolver::resolve_before`].
    pub async fn resolve(&self, url: &Url) -> Result<Vec<Url>, ResolveError> {
        self.resolve_before(url, Deadline::after(self.timeout)).await
    }

    /// Resolves `url` to a deduplicated list of feed URLs, all work bounded by `deadline`.
    ///
    /// 1. A catalog page URL is answered straight from the catalog API.
    /// 2. A URL that already serves a podcast feed is returned unchanged.
    /// 3. Any other non-HTML response yields nothing.
    /// 4. An HTML page is scanned for catalog links, typed `<link>` tags and,
    ///    failing those, a sample of its anchors.
    ///
    /// Running out of time anywhere yields whatever is known so far as "nothing",
    /// never an error.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Fetch`] only when the input URL cannot be
    /// fetched at the transport level (DNS, connect, TLS).
    pub async fn resolve_before(
        &self,
        url: &Url,
        deadline: Deadline,
    ) -> Result<Vec<Url>, ResolveError> {
        if let Some(id) = catalog_id(url) {
            tracing::debug!(url = %url, catalog_id = %id, "Catalog page, skipping page fetch");
            let listed = self.catalog.feed_urls(&self.fetcher, &id, deadline).await;
            return Ok(dedup_urls(listed));
        }

        tracing::trace!(url = %url, "[resolve] GET");
        let response = match self.fetcher.get(url, deadline).await {
            Ok(response) => response,
            Err(FetchError::Timeout) => {
                tracing::warn!(url = %url, "Deadline passed before the page responded");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ResolveError::Fetch {
                    url: url.clone(),
                    source,
                })
            }
        };

        let page_url = response.url().clone();
        if media_type(&response).as_deref() != Some(HTML_MEDIA_TYPE) {
            // Only a feed can still be useful here
            if is_feed_response(&self.fetcher, response, deadline).await {
                tracing::debug!(url = %url, "Input is already a podcast feed");
                return Ok(vec![url.clone()]);
            }
            tracing::debug!(url = %url, "Input is neither a podcast feed nor HTML");
            return Ok(Vec::new());
        }

        let body = match self.fetcher.read_body(response, deadline).await {
            Ok(body) => body,
            Err(source @ FetchError::Network(_)) => {
                return Err(ResolveError::Fetch {
                    url: url.clone(),
                    source,
                })
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not read HTML page");
                return Ok(Vec::new());
            }
        };

        let candidates = scan_html(&String::from_utf8_lossy(&body), &page_url);
        tracing::debug!(
            url = %page_url,
            anchors = candidates.anchors.len(),
            feed_links = candidates.feed_links.len(),
            "Scanned HTML page"
        );

        let feed_urls = find_feed_urls(&self.fetcher, &self.catalog, &candidates, deadline).await;
        tracing::debug!(url = %url, found = feed_urls.len(), "Resolution complete");
        Ok(feed_urls)
    }
}
