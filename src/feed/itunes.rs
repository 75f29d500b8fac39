use crate::feed::fetcher::{ensure_success, Deadline, FetchError, Fetcher};
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Host (or parent domain) of catalog pages that carry a podcast ID.
pub const CATALOG_DOMAIN: &str = "itunes.apple.com";

/// Public catalog lookup API.
pub const LOOKUP_ENDPOINT: &str = "https://itunes.apple.com/lookup";

/// Path ending in `/id<digits>`, e.g. `/us/podcast/some-show/id135798`.
#[allow(clippy::expect_used)]
static CATALOG_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/id(\d+)$").expect("catalog ID regex is valid") // Static pattern, safe to panic
});

/// Numeric podcast identifier taken from a catalog page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts the catalog ID from a catalog page URL.
///
/// The host must be [`CATALOG_DOMAIN`] or one of its subdomains and the path
/// must end in `/id` followed by digits. Any other URL yields `None`.
///
/// # Examples
///
/// ```
/// use podlink::feed::catalog_id;
/// use url::Url;
///
/// let url = Url::parse("https://itunes.apple.com/us/podcast/show/id135798").unwrap();
/// assert_eq!(catalog_id(&url).unwrap().as_str(), "135798");
///
/// let other = Url::parse("https://example.com/podcast/id135798").unwrap();
/// assert!(catalog_id(&other).is_none());
/// ```
pub fn catalog_id(url: &Url) -> Option<CatalogId> {
    let host = url.host_str()?;
    let on_catalog_host = host == CATALOG_DOMAIN
        || host
            .strip_suffix(CATALOG_DOMAIN)
            .is_some_and(|prefix| prefix.ends_with('.'));
    if !on_catalog_host {
        return None;
    }

    let captures = CATALOG_ID_PATTERN.captures(url.path())?;
    Some(CatalogId(captures[1].to_owned()))
}

/// Shape of the lookup API response. Only `results[*].feedUrl` is of interest.
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Client for the catalog lookup API.
#[derive(Debug, Clone)]
pub struct ItunesCatalog {
    lookup_endpoint: Url,
}

impl ItunesCatalog {
    pub fn new(lookup_endpoint: Url) -> Self {
        Self { lookup_endpoint }
    }

    /// Builds `<endpoint>?id=<id>&entity=podcast`.
    pub fn lookup_url(&self, id: &CatalogId) -> Url {
        let mut url = self.lookup_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id", id.as_str())
            .append_pair("entity", "podcast");
        url
    }

    /// Resolves one catalog ID to the feed URLs the catalog lists for it.
    ///
    /// Never fails: a non-success status, timeout, network error, or
    /// unparseable body all yield an empty list. Individual results without a
    /// usable `feedUrl` are skipped.
    pub async fn feed_urls(
        &self,
        fetcher: &Fetcher,
        id: &CatalogId,
        deadline: Deadline,
    ) -> Vec<Url> {
        match self.lookup(fetcher, id, deadline).await {
            Ok(urls) => {
                tracing::debug!(catalog_id = %id, count = urls.len(), "Catalog lookup complete");
                urls
            }
            Err(LookupError::Fetch(FetchError::Timeout)) => {
                tracing::debug!(catalog_id = %id, "Catalog lookup cancelled by deadline");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(catalog_id = %id, error = %e, "Catalog lookup failed");
                Vec::new()
            }
        }
    }

    /// Resolves several IDs concurrently and concatenates the results in ID order.
    ///
    /// A failing lookup contributes nothing; it does not cancel its siblings.
    pub async fn feed_urls_for_all(
        &self,
        fetcher: &Fetcher,
        ids: &[CatalogId],
        deadline: Deadline,
    ) -> Vec<Url> {
        let lookups = ids.iter().map(|id| self.feed_urls(fetcher, id, deadline));
        join_all(lookups).await.into_iter().flatten().collect()
    }

    async fn lookup(
        &self,
        fetcher: &Fetcher,
        id: &CatalogId,
        deadline: Deadline,
    ) -> Result<Vec<Url>, LookupError> {
        let url = self.lookup_url(id);
        tracing::trace!(url = %url, "[catalog_lookup] GET");

        let response = fetcher.get(&url, deadline).await?;
        ensure_success(response.status())?;
        let body = fetcher.read_body(response, deadline).await?;
        Ok(parse_lookup_response(&body)?)
    }
}

#[derive(Debug, thiserror::Error)]
enum LookupError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed lookup response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extracts `results[*].feedUrl` from a lookup API body.
///
/// A body without a `results` array yields no URLs. Entries whose `feedUrl` is
/// missing, not a string, or not an absolute URL are skipped.
fn parse_lookup_response(body: &[u8]) -> Result<Vec<Url>, serde_json::Error> {
    let response: LookupResponse = serde_json::from_slice(body)?;

    Ok(response
        .results
        .iter()
        .filter_map(|result| result.get("feedUrl")?.as_str())
        .filter_map(|feed_url| match Url::parse(feed_url) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!(
                    feed_url = %feed_url,
                    error = %e,
                    "Skipping unparseable catalog feedUrl"
                );
                None
            }
        })
        .collect())
}
