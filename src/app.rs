use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::{FeedFetcher, FeedSyncer, FetchFeed, SyncReport};
use crate::models::FeedSource;
use crate::services::{feed_url, ClockFeed, MediaDownloader, StageMedia};
use crate::store::{LogStore, RotationPolicy, RotationRecord, Watermark};

/// A configured feed as shown to readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedListing {
    pub name: String,
    pub url: String,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Everything the jobs, the HTTP layer and the CLI need, built once at startup.
pub struct App {
    config: Config,
    store: LogStore,
    syncer: FeedSyncer,
    rotation: RotationPolicy,
    clock: ClockFeed,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(FeedFetcher::new(config.fetch_timeout()));
        let media: Arc<dyn StageMedia> = Arc::new(MediaDownloader::new(
            config.root.clone(),
            &config.base_url,
            config.fetch_timeout(),
        ));
        Self::with_parts(config, fetcher, Some(media))
    }

    pub fn with_parts(
        config: Config,
        fetcher: Arc<dyn FetchFeed>,
        media: Option<Arc<dyn StageMedia>>,
    ) -> Result<Self> {
        let store = LogStore::new(config.root.clone())?;

        let mut syncer = FeedSyncer::new(store.clone(), fetcher);
        if let Some(media) = media {
            syncer = syncer.with_media(media);
        }

        Ok(Self {
            rotation: RotationPolicy::new(store.clone()),
            clock: ClockFeed::new(store.clone(), &config.base_url),
            syncer,
            store,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub async fn sync_feed(&self, name: &str) -> Result<SyncReport> {
        let source = self
            .config
            .source(name)
            .ok_or_else(|| AppError::UnknownFeed(name.to_string()))?;
        self.sync_source(&source).await
    }

    async fn sync_source(&self, source: &FeedSource) -> Result<SyncReport> {
        match self.syncer.sync_once(source).await {
            Ok(report) => {
                if report.new > 0 {
                    tracing::info!("Updated {}", report);
                } else {
                    tracing::debug!("Updated {}", report);
                }
                Ok(report)
            }
            Err(e) => {
                if e.is_fetch() {
                    tracing::warn!("Error fetching feed {}: {}: {}", source.name, source.url, e);
                } else {
                    tracing::error!("Error updating feed {}: {}: {}", source.name, source.url, e);
                }
                Err(e)
            }
        }
    }

    /// Syncs every configured feed, up to `concurrency` at a time. A failing
    /// feed is logged and does not affect the others.
    pub async fn sync_all(&self) -> Vec<(String, Result<SyncReport>)> {
        let sources = self.config.sources();
        stream::iter(sources)
            .map(|source| async move {
                let result = self.sync_source(&source).await;
                (source.name, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    pub fn rotate_all(&self) -> Result<Vec<RotationRecord>> {
        self.rotation.rotate_all(self.config.max_size)
    }

    pub fn tick_clock(&self) -> Result<()> {
        self.clock.tick()
    }

    /// Configured feeds sorted by name, with the log's modification time.
    pub fn feeds(&self) -> Vec<FeedListing> {
        self.config
            .feeds
            .keys()
            .map(|name| {
                let last_updated = match self.store.watermark_of(name) {
                    Ok(Watermark::At(at)) if at > DateTime::<Utc>::UNIX_EPOCH => Some(at),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Error getting feed stats for {}: {}", name, e);
                        None
                    }
                };
                FeedListing {
                    name: name.clone(),
                    url: feed_url(&self.config.base_url, name),
                    last_updated,
                }
            })
            .collect()
    }
}
