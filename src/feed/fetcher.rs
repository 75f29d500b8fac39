use futures::StreamExt;
use reqwest::{Client, Method, Response, StatusCode};
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Identifying user agent sent on every request.
pub const USER_AGENT: &str = concat!("podlink/", env!("CARGO_PKG_VERSION"));

/// Default upper bound on any response body (20MB). Long-running shows publish large feeds.
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// Errors that can occur while talking to a remote server.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The shared deadline expired before the operation completed
    #[error("deadline exceeded")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured size limit
    #[error("response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
}

/// A single expiry instant shared by every step of one resolution.
///
/// Passed by value into each I/O call; expiry cancels whatever future is
/// currently running under [`Deadline::run`].
#[derive(Debug, Clone, Copy)]
pub struct Deadline(tokio::time::Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(tokio::time::Instant::now() + timeout)
    }

    pub fn is_expired(&self) -> bool {
        tokio::time::Instant::now() >= self.0
    }

    /// Runs `fut` to completion or fails with [`FetchError::Timeout`] once the deadline passes.
    pub async fn run<F: Future>(self, fut: F) -> Result<F::Output, FetchError> {
        tokio::time::timeout_at(self.0, fut)
            .await
            .map_err(|_| FetchError::Timeout)
    }
}

/// Returns the process-wide HTTP client, building it on first use.
///
/// The returned handle is a cheap clone sharing one connection pool, so it is
/// safe to hand to any number of concurrent validations.
///
/// # Errors
///
/// Returns [`FetchError::Network`] if the TLS backend cannot be initialized.
pub fn shared_client() -> Result<Client, FetchError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }
    let built = build_client()?;
    // Another thread may have won the race; either way everyone gets the stored client.
    Ok(HTTP_CLIENT.get_or_init(|| built).clone())
}

fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .gzip(true)
        .deflate(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// Issues requests through a shared client, always bounded by a [`Deadline`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_body_bytes: usize,
}

impl Fetcher {
    pub fn new(client: Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }

    /// Sends a GET request. Non-2xx responses are returned, not treated as errors.
    pub async fn get(&self, url: &Url, deadline: Deadline) -> Result<Response, FetchError> {
        self.send(Method::GET, url, deadline).await
    }

    /// Sends a HEAD request. Non-2xx responses are returned, not treated as errors.
    pub async fn head(&self, url: &Url, deadline: Deadline) -> Result<Response, FetchError> {
        self.send(Method::HEAD, url, deadline).await
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        deadline: Deadline,
    ) -> Result<Response, FetchError> {
        let request = self.client.request(method, url.clone()).send();
        Ok(deadline.run(request).await??)
    }

    /// Reads a response body with a size limit using stream-based reading.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Timeout`] if the deadline passes mid-read,
    /// [`FetchError::ResponseTooLarge`] if the body exceeds the limit, or
    /// [`FetchError::Network`] if the connection fails.
    pub async fn read_body(
        &self,
        response: Response,
        deadline: Deadline,
    ) -> Result<Vec<u8>, FetchError> {
        let limit = self.max_body_bytes;

        // Fast path: check Content-Length header
        if let Some(len) = response.content_length() {
            if usize::try_from(len).map_or(true, |len| len > limit) {
                return Err(FetchError::ResponseTooLarge(limit));
            }
        }

        deadline
            .run(async move {
                let mut bytes = Vec::new();
                let mut stream = response.bytes_stream();

                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(FetchError::Network)?;
                    if bytes.len().saturating_add(chunk.len()) > limit {
                        return Err(FetchError::ResponseTooLarge(limit));
                    }
                    bytes.extend_from_slice(&chunk);
                }

                Ok::<_, FetchError>(bytes)
            })
            .await?
    }
}

/// Extracts the media type from a response's `Content-Type`, parameters stripped and lowercased.
///
/// `text/html; charset=utf-8` becomes `text/html`.
pub fn media_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_media_type)
}

fn parse_media_type(header: &str) -> Option<String> {
    let essence = header.split(';').next()?.trim();
    if essence.is_empty() {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

/// Converts a non-2xx status into [`FetchError::HttpStatus`].
pub fn ensure_success(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::HttpStatus(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(shared_client().unwrap(), 1024)
    }

    #[test]
    fn test_parse_media_type_strips_parameters() {
        assert_eq!(
            parse_media_type("text/html; charset=utf-8").as_deref(),
            Some("text/html")
        );
    }

    #[test]
    fn test_parse_media_type_lowercases() {
        assert_eq!(
            parse_media_type("Application/RSS+XML").as_deref(),
            Some("application/rss+xml")
        );
    }

    #[test]
    fn test_parse_media_type_empty() {
        assert_eq!(parse_media_type(""), None);
        assert_eq!(parse_media_type("  ; charset=utf-8"), None);
    }

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success(StatusCode::OK).is_ok());
        assert!(matches!(
            ensure_success(StatusCode::NOT_FOUND),
            Err(FetchError::HttpStatus(404))
        ));
    }

    #[test]
    fn test_shared_client_is_reused() {
        // Building twice must not fail and must hand out the same pool
        assert!(shared_client().is_ok());
        assert!(shared_client().is_ok());
        assert!(HTTP_CLIENT.get().is_some());
    }

    #[tokio::test]
    async fn test_deadline_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        let result = deadline
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_deadline_allows_fast_future() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(deadline.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let deadline = Deadline::after(Duration::from_secs(5));
        let url = Url::parse(&format!("{}/small", server.uri())).unwrap();
        let response = fetcher.get(&url, deadline).await.unwrap();
        let body = fetcher.read_body(response, deadline).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_read_body_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let deadline = Deadline::after(Duration::from_secs(5));
        let url = Url::parse(&format!("{}/big", server.uri())).unwrap();
        let response = fetcher.get(&url, deadline).await.unwrap();
        let result = fetcher.read_body(response, deadline).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_get_times_out_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let deadline = Deadline::after(Duration::from_millis(100));
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let result = fetcher.get(&url, deadline).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_media_type_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/rss+xml; charset=UTF-8"),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let deadline = Deadline::after(Duration::from_secs(5));
        let url = Url::parse(&format!("{}/feed", server.uri())).unwrap();
        let response = fetcher.head(&url, deadline).await.unwrap();
        assert_eq!(media_type(&response).as_deref(), Some("application/rss+xml"));
    }
}
