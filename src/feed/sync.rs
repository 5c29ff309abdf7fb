use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{FeedSource, RemoteEntry};
use crate::services::StageMedia;
use crate::store::{LogStore, Watermark};

use super::{EntryRenderer, FetchFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Diffing,
    Appending,
    Failed,
}

/// Counters for one `sync_once` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub name: String,
    /// Entries appended to the log.
    pub new: usize,
    /// Entries at or before the watermark.
    pub old: usize,
    /// Entries without a publish date.
    pub invalid: usize,
    /// Entries dated after the run started, left for a later run.
    pub future: usize,
}

impl SyncReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty_feed(&self) -> bool {
        self.new + self.old + self.future == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} new, {} old, {} invalid, {} future",
            self.name, self.new, self.old, self.invalid, self.future
        )
    }
}

/// Imports new remote entries into a feed's log.
pub struct FeedSyncer {
    store: LogStore,
    fetcher: Arc<dyn FetchFeed>,
    renderer: EntryRenderer,
    media: Option<Arc<dyn StageMedia>>,
}

impl FeedSyncer {
    pub fn new(store: LogStore, fetcher: Arc<dyn FetchFeed>) -> Self {
        Self {
            store,
            fetcher,
            renderer: EntryRenderer::default(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn StageMedia>) -> Self {
        self.media = Some(media);
        self
    }

    /// Fetches `source` and appends every entry published after the log's
    /// watermark, in feed order.
    ///
    /// The watermark is read before the fetch starts. Entries dated after
    /// that instant are not appended yet: the log's modification time would
    /// stay behind them and they would be imported again on every run.
    ///
    /// A fetch failure leaves the log untouched; an append failure stops the
    /// run but keeps the lines already written, which the next run then skips
    /// via the watermark.
    pub async fn sync_once(&self, source: &FeedSource) -> Result<SyncReport> {
        let name = source.name.as_str();
        let mut state = SyncState::Idle;

        let watermark = self.store.watermark_of(name)?;
        let started = Utc::now();

        transition(name, &mut state, SyncState::Fetching);
        let entries = match self.fetcher.fetch(&source.url).await {
            Ok(entries) => entries,
            Err(e) => {
                transition(name, &mut state, SyncState::Failed);
                return Err(AppError::Fetch(e));
            }
        };

        transition(name, &mut state, SyncState::Diffing);
        let result = self.apply(source, &entries, watermark, started, &mut state).await;
        if result.is_err() {
            transition(name, &mut state, SyncState::Failed);
        }
        let report = result?;

        if report.is_empty_feed() {
            tracing::warn!("Empty or bad feed {} ({})", name, source.url);
        }

        if self.store.ensure_exists(name)? {
            tracing::debug!("Created empty log for {}", name);
        }

        transition(name, &mut state, SyncState::Idle);
        Ok(report)
    }

    async fn apply(
        &self,
        source: &FeedSource,
        entries: &[RemoteEntry],
        watermark: Watermark,
        started: DateTime<Utc>,
        state: &mut SyncState,
    ) -> Result<SyncReport> {
        let name = source.name.as_str();
        let mut report = SyncReport::new(name);

        for entry in entries {
            let Some(published_at) = entry.published_at else {
                tracing::warn!("Skipping entry without publish date in {}: {}", name, entry.title);
                report.invalid += 1;
                continue;
            };

            if !watermark.is_before(published_at) {
                report.old += 1;
                continue;
            }

            if published_at > started {
                tracing::debug!(
                    "Deferring future entry in {}: {} ({})",
                    name,
                    entry.title,
                    published_at
                );
                report.future += 1;
                continue;
            }

            let media_uri = self.stage_media(entry).await;
            let Some(line) = self.renderer.render(entry, media_uri.as_deref()) else {
                report.invalid += 1;
                continue;
            };

            if *state != SyncState::Appending {
                transition(name, state, SyncState::Appending);
            }
            let store = self.store.clone();
            let feed = name.to_string();
            tokio::task::spawn_blocking(move || store.append(&feed, &line)).await??;
            report.new += 1;
        }

        Ok(report)
    }

    async fn stage_media(&self, entry: &RemoteEntry) -> Option<String> {
        let media = self.media.as_ref()?;
        let image = entry.image.as_ref()?;
        match media.stage(&image.url).await {
            Ok(uri) => Some(uri),
            Err(e) => {
                tracing::warn!("Error downloading item image from {}: {}", image.url, e);
                None
            }
        }
    }
}

fn transition(name: &str, state: &mut SyncState, next: SyncState) {
    tracing::debug!("{}: {:?} -> {:?}", name, state, next);
    *state = next;
}
