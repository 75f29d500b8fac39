use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a user-supplied URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// Nothing was supplied.
    #[error("Must pass a URL to look up")]
    Empty,
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates the URL a caller asked to resolve.
///
/// Only absolute `http`/`https` URLs are accepted. Anything else is invalid
/// input and is reported before any network traffic happens.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if the string is blank, cannot be parsed,
/// or uses a non-web scheme.
///
/// # Examples
///
/// ```
/// use podlink::util::validate_query_url;
///
/// let url = validate_query_url("https://example.com/show").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_query_url("not a url").is_err());
/// assert!(validate_query_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_query_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let url = Url::parse(trimmed)?;
    if !is_web_scheme(&url) {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    Ok(url)
}

/// Returns `true` for `http` and `https` URLs.
pub fn is_web_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Resolves an `href` found in a document against the document's URL.
///
/// Returns `None` when the reference cannot be turned into an absolute URL.
/// Relative, protocol-relative, and absolute references are all handled by
/// the URL parser, which also normalizes the path.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    base.join(href).ok()
}
