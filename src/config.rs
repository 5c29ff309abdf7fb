use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FeedSource;
use crate::services::CLOCK_FEED;

const APP_DIR: &str = "rss2twtxt";
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the `<name>.txt` logs, avatars and staged media.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Logs larger than this many bytes are rotated.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u64,

    #[serde(default = "default_rotate_interval")]
    pub rotate_interval_hours: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Max feeds synced at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_true")]
    pub clock_feed: bool,

    /// Feed name -> feed URL.
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,

    #[serde(skip)]
    pub(crate) path: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_size() -> u64 {
    1 << 20
}

fn default_update_interval() -> u64 {
    5
}

fn default_rotate_interval() -> u64 {
    24
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_url: default_base_url(),
            bind: default_bind(),
            max_size: default_max_size(),
            update_interval_minutes: default_update_interval(),
            rotate_interval_hours: default_rotate_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            concurrency: default_concurrency(),
            clock_feed: default_true(),
            feeds: BTreeMap::new(),
            path: None,
        }
    }
}

impl Config {
    /// Loads the config at `path` (or the default location), writing out
    /// defaults if the file does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let mut config: Config = toml::from_str(&content)?;
            config.path = Some(config_path);
            config.validate()?;
            Ok(config)
        } else {
            let config = Config {
                path: Some(config_path),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.path.clone().unwrap_or_else(Self::config_path);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        for name in self.feeds.keys() {
            validate_name(name)?;
            self.check_not_reserved(name)?;
        }
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }
        if self.update_interval_minutes == 0 || self.rotate_interval_hours == 0 {
            return Err(AppError::Config("intervals must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn sources(&self) -> Vec<FeedSource> {
        self.feeds
            .iter()
            .map(|(name, url)| FeedSource::new(name.clone(), url.clone()))
            .collect()
    }

    pub fn source(&self, name: &str) -> Option<FeedSource> {
        self.feeds
            .get(name)
            .map(|url| FeedSource::new(name, url.clone()))
    }

    pub fn add_feed(&mut self, name: &str, url: &str) -> Result<()> {
        validate_name(name)?;
        self.check_not_reserved(name)?;
        if self.feeds.contains_key(name) {
            return Err(AppError::FeedExists(name.to_string()));
        }
        url::Url::parse(url).map_err(|e| AppError::Config(format!("invalid URL {}: {}", url, e)))?;
        self.feeds.insert(name.to_string(), url.to_string());
        Ok(())
    }

    /// The clock feed rewrites its log on every tick, so no imported feed may share its name.
    fn check_not_reserved(&self, name: &str) -> Result<()> {
        if self.clock_feed && name == CLOCK_FEED {
            return Err(AppError::InvalidName(format!(
                "{} (reserved for the clock feed)",
                name
            )));
        }
        Ok(())
    }

    pub fn remove_feed(&mut self, name: &str) -> Result<()> {
        self.feeds
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::UnknownFeed(name.to_string()))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }

    pub fn rotate_interval(&self) -> Duration {
        Duration::from_secs(self.rotate_interval_hours * 60 * 60)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Feed names double as file stems and URL path segments.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = Regex::new(r"^[a-zA-Z][a-zA-Z0-9_\- ]*$").expect("valid name pattern");
    if name.len() > MAX_NAME_LEN {
        return Err(AppError::InvalidName(format!("{} (name is too long)", name)));
    }
    if !valid.is_match(name) {
        return Err(AppError::InvalidName(name.to_string()));
    }
    Ok(())
}
