//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: Checking caller-supplied URLs before any network traffic
//! - **Reference resolution**: Turning `href` values into absolute candidate URLs
//!
//! # Examples
//!
//! ```
//! use podlink::util::{resolve_href, validate_query_url};
//!
//! let page = validate_query_url("https://example.com/show/").unwrap();
//! let feed = resolve_href(&page, "feed.xml").unwrap();
//! assert_eq!(feed.as_str(), "https://example.com/show/feed.xml");
//! ```

mod url_validator;

pub use url_validator::{is_web_scheme, resolve_href, validate_query_url, UrlValidationError};
