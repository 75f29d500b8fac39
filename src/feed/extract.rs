use crate::feed::classify::{is_feed_media_type, is_feed_url, Precheck};
use crate::feed::fetcher::{Deadline, Fetcher};
use crate::feed::itunes::{catalog_id, CatalogId, ItunesCatalog};
use crate::util::resolve_href;
use futures::future::join_all;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Number of anchors checked from each end of the page in the fallback scan.
///
/// Feed links tend to live in the header navigation or the footer, so the
/// fallback looks at the first and last few links only. This is a heuristic,
/// not a completeness guarantee.
pub const ANCHOR_WINDOW: usize = 10;

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid")); // Static pattern, safe to panic

#[allow(clippy::expect_used)]
static FEED_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[type][href]").expect("link selector is valid")); // Static pattern, safe to panic

/// Feed candidates scraped from one HTML document.
///
/// Everything here is already resolved against the page URL. Nothing has
/// been fetched yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageCandidates {
    /// Every resolvable `<a href>` with its fragment dropped, in document order (duplicates kept).
    pub anchors: Vec<Url>,
    /// `<link href>` tags whose `type` is a feed media type, in document order.
    pub feed_links: Vec<Url>,
}

impl PageCandidates {
    /// Distinct catalog IDs linked from the page, in order of first appearance.
    pub fn catalog_ids(&self) -> Vec<CatalogId> {
        let mut seen = HashSet::new();
        self.anchors
            .iter()
            .filter_map(catalog_id)
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// The anchors worth checking when nothing better is on the page.
    ///
    /// Anchors are deduplicated, then the first and last [`ANCHOR_WINDOW`]
    /// are taken in document order. A page with few links is checked in full.
    pub fn anchor_sample(&self) -> Vec<Url> {
        let distinct = dedup_urls(self.anchors.iter().cloned());
        if distinct.len() <= ANCHOR_WINDOW * 2 {
            return distinct;
        }

        let tail_start = distinct.len() - ANCHOR_WINDOW;
        distinct[..ANCHOR_WINDOW]
            .iter()
            .chain(&distinct[tail_start..])
            .cloned()
            .collect()
    }
}

/// Collects anchor and `<link>` candidates from an HTML document.
///
/// `href` values that cannot be resolved against `base` are dropped. Anchor
/// fragments are cleared so in-page links (`#top`) collapse onto their page.
pub fn scan_html(html: &str, base: &Url) -> PageCandidates {
    let document = Html::parse_document(html);

    let anchors = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_href(base, href))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect();

    let feed_links = document
        .select(&FEED_LINK_SELECTOR)
        .filter(|link| is_feed_media_type(link.value().attr("type")))
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| resolve_href(base, href))
        .collect();

    PageCandidates {
        anchors,
        feed_links,
    }
}

/// Turns a page's candidates into validated feed URLs.
///
/// Runs in a fixed order:
///
/// 1. Catalog IDs found in anchors are looked up in the catalog.
/// 2. Typed `<link>` tags are fetched and body-checked (the declared type
///    stands in for the HEAD pre-check).
/// 3. Only if steps 1 and 2 found nothing, a sample of anchors is checked
///    with the full HEAD + GET validation. Skipped once the deadline has passed.
///
/// The result is deduplicated, keeping the first occurrence.
pub async fn find_feed_urls(
    fetcher: &Fetcher,
    catalog: &ItunesCatalog,
    candidates: &PageCandidates,
    deadline: Deadline,
) -> Vec<Url> {
    let catalog_ids = candidates.catalog_ids();
    let mut results = catalog
        .feed_urls_for_all(fetcher, &catalog_ids, deadline)
        .await;
    tracing::debug!(
        ids = catalog_ids.len(),
        found = results.len(),
        "Catalog links checked"
    );

    let feed_links = dedup_urls(candidates.feed_links.iter().cloned());
    let linked = validate_all(fetcher, &feed_links, deadline, Precheck::Skip).await;
    tracing::debug!(
        candidates = feed_links.len(),
        found = linked.len(),
        "Link tags checked"
    );
    results.extend(linked);

    if results.is_empty() && deadline.is_expired() {
        tracing::debug!("Deadline passed, skipping anchor fallback");
    } else if results.is_empty() {
        let sample = candidates.anchor_sample();
        let anchored = validate_all(fetcher, &sample, deadline, Precheck::Head).await;
        tracing::debug!(
            candidates = sample.len(),
            found = anchored.len(),
            "Anchor fallback checked"
        );
        results.extend(anchored);
    }

    dedup_urls(results)
}

/// Validates every candidate concurrently and keeps those that are feeds, in input order.
async fn validate_all(
    fetcher: &Fetcher,
    candidates: &[Url],
    deadline: Deadline,
    precheck: Precheck,
) -> Vec<Url> {
    let checks = candidates.iter().map(|url| async move {
        is_feed_url(fetcher, url, deadline, precheck)
            .await
            .then(|| url.clone())
    });
    join_all(checks).await.into_iter().flatten().collect()
}

/// Removes repeated URLs, keeping the first occurrence of each.
pub fn dedup_urls(urls: impl IntoIterator<Item = Url>) -> Vec<Url> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
