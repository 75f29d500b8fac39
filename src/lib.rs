//! Resolve podcast pages, catalog listings and feeds to their RSS feed URLs.

pub mod config;
pub mod feed;
pub mod util;

pub use config::{Config, ConfigError};
pub use feed::{PodcastResolver, ResolveError};
