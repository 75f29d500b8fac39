use crate::feed::fetcher::{media_type, Deadline, FetchError, Fetcher};
use crate::feed::sanitize::sanitize_xml;
use crate::util::is_web_scheme;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Response;
use url::Url;

/// Media types a podcast feed may be served as.
pub const FEED_MIME_TYPES: [&str; 3] = [
    "application/atom+xml",
    "application/rss+xml",
    "application/xml",
];

pub const AUDIO_ENCLOSURE_TYPE: &str = "audio/mpeg";

/// Whether [`is_feed_url`] should ask the server for the content type before downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// Issue a HEAD first and bail out unless it reports a feed media type.
    Head,
    /// The caller already has a declared feed type (e.g. from a `<link type>` tag).
    Skip,
}

/// Returns `true` if `media_type` (parameters stripped) is one of [`FEED_MIME_TYPES`].
pub fn is_feed_media_type(media_type: Option<&str>) -> bool {
    media_type.is_some_and(|mt| {
        FEED_MIME_TYPES
            .iter()
            .any(|feed| feed.eq_ignore_ascii_case(mt.trim()))
    })
}

/// Decides whether an already-received response is a podcast feed.
///
/// True only for a 2xx status, a whitelisted content type, an `rss` root
/// element, and at least one `<enclosure type="audio/mpeg">` anywhere in the
/// document. The body is only downloaded once the cheap checks pass.
pub async fn is_feed_response(fetcher: &Fetcher, response: Response, deadline: Deadline) -> bool {
    let url = response.url().clone();

    if !response.status().is_success() {
        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            "Not a feed: non-success status"
        );
        return false;
    }

    if !is_feed_media_type(media_type(&response).as_deref()) {
        tracing::debug!(url = %url, "Not a feed: content type not in feed whitelist");
        return false;
    }

    match fetcher.read_body(response, deadline).await {
        Ok(body) => is_podcast_document(&body),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to read feed body");
            false
        }
    }
}

/// Decides whether `url` points at a podcast feed. Never fails: every error is logged and
/// reported as "not a feed".
pub async fn is_feed_url(
    fetcher: &Fetcher,
    url: &Url,
    deadline: Deadline,
    precheck: Precheck,
) -> bool {
    if !is_web_scheme(url) {
        return false;
    }

    match check_feed_url(fetcher, url, deadline, precheck).await {
        Ok(is_feed) => is_feed,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Error checking if URL is a podcast feed");
            false
        }
    }
}

async fn check_feed_url(
    fetcher: &Fetcher,
    url: &Url,
    deadline: Deadline,
    precheck: Precheck,
) -> Result<bool, FetchError> {
    if precheck == Precheck::Head && !has_feed_type(fetcher, url, deadline).await? {
        return Ok(false);
    }

    tracing::trace!(url = %url, "[is_feed_url] GET");
    let response = fetcher.get(url, deadline).await?;
    Ok(is_feed_response(fetcher, response, deadline).await)
}

/// HEAD pre-check. Only the content type is inspected; the status is not.
async fn has_feed_type(
    fetcher: &Fetcher,
    url: &Url,
    deadline: Deadline,
) -> Result<bool, FetchError> {
    tracing::trace!(url = %url, "[has_feed_type] HEAD");
    match fetcher.head(url, deadline).await {
        Ok(response) => Ok(is_feed_media_type(media_type(&response).as_deref())),
        Err(FetchError::Timeout) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Body-level feed check: `rss` root with at least one audio enclosure.
///
/// The bytes are decoded as UTF-8 (lossily) and passed through the XML
/// character filter first, so stray control characters do not sink an
/// otherwise valid feed. Documents that are not well-formed are rejected.
pub fn is_podcast_document(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let text = sanitize_xml(text.trim_start_matches('\u{feff}'));

    match scan_document(&text) {
        Ok(is_podcast) => is_podcast,
        Err(e) => {
            tracing::debug!(error = %e, "Not a feed: XML parse error");
            false
        }
    }
}

fn scan_document(xml: &str) -> Result<bool, quick_xml::Error> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; custom entities in
    // attribute values surface as errors from decode_and_unescape_value() and sink the check.
    let mut reader = Reader::from_str(xml);
    let mut depth: usize = 0;
    let mut seen_root = false;
    let mut has_audio = false;

    loop {
        let event = reader.read_event()?;
        let (element, opens) = match &event {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if depth == 0 {
            // A second top-level element is as malformed as a wrong root
            if seen_root || element.name().as_ref() != b"rss" {
                return Ok(false);
            }
            seen_root = true;
        }

        if !has_audio && element.name().as_ref() == b"enclosure" {
            has_audio = is_audio_enclosure(element, &reader)?;
        }

        if opens {
            depth += 1;
        }
    }

    // Unclosed elements at EOF mean the document was truncated
    Ok(seen_root && depth == 0 && has_audio)
}

fn is_audio_enclosure(
    element: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<bool, quick_xml::Error> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"type" {
            let value = attr.decode_and_unescape_value(reader.decoder())?;
            return Ok(value == AUDIO_ENCLOSURE_TYPE);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::shared_client;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Show</title>
    <item>
      <title>Episode 1</title>
      <enclosure url="https://cdn.example.com/ep1.mp3" length="1234" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn fetcher() -> Fetcher {
        Fetcher::new(shared_client().unwrap(), 1024 * 1024)
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    // --- Media type whitelist ---

    #[test]
    fn test_feed_media_types_accepted() {
        assert!(is_feed_media_type(Some("application/rss+xml")));
        assert!(is_feed_media_type(Some("application/atom+xml")));
        assert!(is_feed_media_type(Some("application/xml")));
    }

    #[test]
    fn test_other_media_types_rejected() {
        assert!(!is_feed_media_type(Some("text/html")));
        assert!(!is_feed_media_type(Some("text/xml")));
        assert!(!is_feed_media_type(Some("audio/mpeg")));
        assert!(!is_feed_media_type(None));
    }

    // --- Body-level checks ---

    #[test]
    fn test_podcast_rss_accepted() {
        assert!(is_podcast_document(PODCAST_RSS.as_bytes()));
    }

    #[test]
    fn test_nested_enclosure_found_at_any_depth() {
        let xml = r#"<rss><channel><item><media><group>
            <enclosure type="audio/mpeg" url="a.mp3"></enclosure>
        </group></media></item></channel></rss>"#;
        assert!(is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_atom_root_rejected() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><enclosure type="audio/mpeg"/></entry></feed>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_rss_without_enclosure_rejected() {
        let xml = r#"<rss><channel><item><title>Blog post</title></item></channel></rss>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_non_audio_enclosure_rejected() {
        let xml = r#"<rss><channel><item>
            <enclosure type="video/mp4" url="a.mp4"/>
            <enclosure type="audio/x-m4a" url="a.m4a"/>
        </item></channel></rss>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_one_audio_enclosure_among_many_is_enough() {
        let xml = r#"<rss><channel>
            <item><enclosure type="video/mp4"/></item>
            <item><enclosure type="audio/mpeg"/></item>
        </channel></rss>"#;
        assert!(is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        let xml = r#"<rss><channel><enclosure type="audio/mpeg"/></item></rss>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_truncated_document_rejected() {
        let xml = r#"<rss><channel><item><enclosure type="audio/mpeg"/></item>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_html_rejected() {
        assert!(!is_podcast_document(b"<html><body>Hello</body></html>"));
        assert!(!is_podcast_document(b""));
    }

    #[test]
    fn test_control_character_filtered_before_parsing() {
        let xml = "<rss><channel><title>Bad\u{2}Title</title>\
            <item><enclosure type=\"audio/mpeg\"/></item></channel></rss>";
        assert!(is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_byte_order_mark_tolerated() {
        let xml = format!("\u{feff}{PODCAST_RSS}");
        assert!(is_podcast_document(xml.as_bytes()));
    }

    #[test]
    fn test_unknown_entity_in_type_rejected() {
        let xml = r#"<rss><channel><enclosure type="&xxe;"/></channel></rss>"#;
        assert!(!is_podcast_document(xml.as_bytes()));
    }

    // --- Network checks ---

    #[tokio::test]
    async fn test_is_feed_url_rejects_non_web_scheme() {
        let url = Url::parse("ftp://example.com/feed.xml").unwrap();
        assert!(!is_feed_url(&fetcher(), &url, deadline(), Precheck::Head).await);
    }

    #[tokio::test]
    async fn test_is_feed_url_with_head_precheck() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PODCAST_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed.xml", server.uri())).unwrap();
        assert!(is_feed_url(&fetcher(), &url, deadline(), Precheck::Head).await);
    }

    #[tokio::test]
    async fn test_head_precheck_avoids_get_for_html() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/about", server.uri())).unwrap();
        assert!(!is_feed_url(&fetcher(), &url, deadline(), Precheck::Head).await);
    }

    #[tokio::test]
    async fn test_skip_precheck_goes_straight_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PODCAST_RSS)
                    .insert_header("Content-Type", "application/xml; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        assert!(is_feed_url(&fetcher(), &url, deadline(), Precheck::Skip).await);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_a_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string(PODCAST_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        assert!(!is_feed_url(&fetcher(), &url, deadline(), Precheck::Skip).await);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_not_a_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PODCAST_RSS)
                    .insert_header("Content-Type", "text/plain"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        assert!(!is_feed_url(&fetcher(), &url, deadline(), Precheck::Skip).await);
    }

    #[tokio::test]
    async fn test_timeout_is_not_a_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(PODCAST_RSS)
                    .insert_header("Content-Type", "application/rss+xml")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        let short = Deadline::after(Duration::from_millis(100));
        assert!(!is_feed_url(&fetcher(), &url, short, Precheck::Skip).await);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_a_feed() {
        // Port 9 (discard) on localhost is closed in test environments
        let url = Url::parse("http://127.0.0.1:9/feed.xml").unwrap();
        assert!(!is_feed_url(&fetcher(), &url, deadline(), Precheck::Skip).await);
    }
}
