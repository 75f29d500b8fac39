use anyhow::{Context, Result};
use clap::Parser;
use podlink::util::validate_query_url;
use podlink::{Config, PodcastResolver};
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "podlink",
    version,
    about = "Find the RSS feeds behind a podcast page or catalog link"
)]
struct Args {
    /// Podcast homepage, episode page, catalog listing or feed URL
    url: String,

    /// Config file (defaults to ~/.config/podlink/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overall deadline in seconds, overriding the config file
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Print one feed URL per line instead of JSON
    #[arg(long)]
    plain: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    query: &'a Url,
    feed_urls: &'a [Url],
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let path = match path.cloned().or_else(Config::default_path) {
        Some(path) => path,
        None => {
            tracing::debug!("HOME not set and no --config given, using defaults");
            return Ok(Config::default());
        }
    };
    Config::load(&path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = load_config(args.config.as_ref())?;
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }

    let query = validate_query_url(&args.url)
        .with_context(|| format!("Not a usable podcast URL: '{}'", args.url))?;

    let resolver = PodcastResolver::from_config(&config).context("Failed to set up resolver")?;
    let feed_urls = resolver
        .resolve(&query)
        .await
        .with_context(|| format!("Failed to resolve '{query}'"))?;

    tracing::info!(query = %query, found = feed_urls.len(), "Resolution finished");

    if args.plain {
        for url in &feed_urls {
            println!("{url}");
        }
    } else {
        let output = Output {
            query: &query,
            feed_urls: &feed_urls,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}
