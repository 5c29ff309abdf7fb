use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured feed: `name` is the log filename stem, `url` the remote RSS/Atom document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub url: String,
    pub title: Option<String>,
}

/// One item of a fetched feed. Lives only until it has been rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteEntry {
    pub published_at: Option<DateTime<Utc>>,
    pub title: String,
    pub link: String,
    pub image: Option<RemoteImage>,
    pub raw_content: Option<String>,
}
