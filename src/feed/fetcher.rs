use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;

use crate::error::FetchError;
use crate::models::{RemoteEntry, RemoteImage};

/// Source of parsed remote entries for a feed URL.
#[async_trait]
pub trait FetchFeed: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RemoteEntry>, FetchError>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("rss2twtxt/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl FetchFeed for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RemoteEntry>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_request)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await.map_err(FetchError::from_request)?;
        let entries = parse_entries(&bytes)?;
        tracing::debug!("Fetched {} entries from {}", entries.len(), url);
        Ok(entries)
    }
}

/// Parses an RSS or Atom document, keeping entries in document order.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RemoteEntry>, FetchError> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(remote_entry).collect())
}

fn remote_entry(entry: Entry) -> RemoteEntry {
    // Try content first, then fall back to summary
    let raw_content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .filter(|c| !c.trim().is_empty());

    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default();

    RemoteEntry {
        published_at: entry.published.or(entry.updated),
        title: entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "Untitled".to_string()),
        link,
        image: entry_image(&entry),
        raw_content,
    }
}

/// First thumbnail, else the first image attachment.
fn entry_image(entry: &Entry) -> Option<RemoteImage> {
    for media in &entry.media {
        let media_title = media.title.as_ref().map(|t| t.content.clone());

        if let Some(thumb) = media.thumbnails.first() {
            return Some(RemoteImage {
                url: thumb.image.uri.clone(),
                title: thumb.image.title.clone().or(media_title),
            });
        }

        let image = media.content.iter().find(|c| {
            c.content_type
                .as_ref()
                .is_some_and(|ct| ct.to_string().starts_with("image/"))
        });
        if let Some(url) = image.and_then(|c| c.url.as_ref()) {
            return Some(RemoteImage {
                url: url.to_string(),
                title: media_title,
            });
        }
    }
    None
}
