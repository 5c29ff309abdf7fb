use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::LogLine;

use super::FeedLocks;

pub const LOG_EXTENSION: &str = "txt";

/// The instant separating already-imported entries from new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// No log yet: everything is new.
    Missing,
    At(DateTime<Utc>),
}

impl Watermark {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Watermark::Missing => DateTime::<Utc>::UNIX_EPOCH,
            Watermark::At(at) => *at,
        }
    }

    /// Strictly-after comparison; an entry stamped exactly at the watermark is not new.
    pub fn is_before(&self, published_at: DateTime<Utc>) -> bool {
        published_at > self.instant()
    }
}

/// Append-only, one-file-per-feed log directory.
///
/// Nothing is cached: every call stats or opens the file again so callers
/// always see what is on disk right now, including a rotation that happened
/// in between.
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    locks: Arc<FeedLocks>,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Arc::new(FeedLocks::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(super) fn locks(&self) -> &FeedLocks {
        &self.locks
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, LOG_EXTENSION))
    }

    /// Appends one record. The file is opened in append mode every time, so
    /// earlier content is never rewritten.
    pub fn append(&self, name: &str, line: &LogLine) -> Result<()> {
        let path = self.path_of(name);
        let record = line.to_record();
        self.locks.with(name, || -> io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(record.as_bytes())?;
            file.flush()
        })?;
        tracing::debug!("Appended {} bytes to {}", record.len(), path.display());
        Ok(())
    }

    /// Modification time of the log, or `Missing` when it does not exist.
    pub fn watermark_of(&self, name: &str) -> Result<Watermark> {
        match fs::metadata(self.path_of(name)) {
            Ok(meta) => Ok(Watermark::At(DateTime::<Utc>::from(meta.modified()?))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Watermark::Missing),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Size in bytes; a missing log counts as empty.
    pub fn size_of(&self, name: &str) -> Result<u64> {
        match fs::metadata(self.path_of(name)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Names of every `*.txt` log in the root directory, sorted.
    pub fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whole log contents, or `None` if the feed has no log.
    pub fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_of(name);
        self.locks.with(name, || match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        })
    }

    /// Creates an empty log if none exists. Returns true when a file was created.
    pub fn ensure_exists(&self, name: &str) -> Result<bool> {
        let path = self.path_of(name);
        self.locks
            .with(name, || match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(AppError::Io(e)),
            })
    }

    /// Truncates the log and writes `lines` in order. Only used by generated
    /// feeds that are not append-only.
    pub fn replace(&self, name: &str, lines: &[LogLine]) -> Result<()> {
        let path = self.path_of(name);
        self.locks.with(name, || -> io::Result<()> {
            let mut file = File::create(&path)?;
            for line in lines {
                file.write_all(line.to_record().as_bytes())?;
            }
            file.flush()
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn line(secs: i64, text: &str) -> LogLine {
        LogLine::new(Utc.timestamp_opt(secs, 0).unwrap(), text)
    }

    #[test]
    fn append_creates_and_then_only_appends() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();

        store.append("news", &line(0, "first")).unwrap();
        store.append("news", &line(60, "second")).unwrap();

        let content = store.read("news").unwrap().unwrap();
        assert_eq!(
            content,
            "1970-01-01T00:00:00Z\tfirst\n1970-01-01T00:01:00Z\tsecond\n"
        );
    }

    #[test]
    fn watermark_is_missing_until_the_log_exists() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();

        let watermark = store.watermark_of("news").unwrap();
        assert_eq!(watermark, Watermark::Missing);
        assert_eq!(watermark.instant(), DateTime::<Utc>::UNIX_EPOCH);
        assert!(watermark.is_before(Utc.timestamp_opt(1, 0).unwrap()));
        assert_eq!(store.size_of("news").unwrap(), 0);
    }

    #[test]
    fn watermark_tracks_modification_time() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();
        store.ensure_exists("news").unwrap();

        let pinned = UNIX_EPOCH + Duration::from_secs(1_672_531_200);
        File::options()
            .write(true)
            .open(store.path_of("news"))
            .unwrap()
            .set_modified(pinned)
            .unwrap();

        let watermark = store.watermark_of("news").unwrap();
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(watermark, Watermark::At(at));
        assert!(!watermark.is_before(at));
        assert!(watermark.is_before(at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn list_all_only_reports_logs() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();
        store.ensure_exists("b").unwrap();
        store.ensure_exists("a").unwrap();
        fs::write(dir.path().join("a.png"), b"png").unwrap();
        fs::write(dir.path().join("a.txt.20230101T000000Z"), b"old").unwrap();
        fs::create_dir(dir.path().join("media")).unwrap();

        assert_eq!(store.list_all().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn ensure_exists_leaves_existing_content_alone() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();
        store.append("news", &line(0, "kept")).unwrap();

        assert!(!store.ensure_exists("news").unwrap());
        assert_eq!(store.size_of("news").unwrap(), 26);
        assert!(store.ensure_exists("other").unwrap());
        assert_eq!(store.read("other").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn replace_truncates() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();
        store.append("clock", &line(0, "one")).unwrap();
        store.append("clock", &line(1, "two")).unwrap();

        store.replace("clock", &[line(2, "three")]).unwrap();
        assert_eq!(
            store.read("clock").unwrap().unwrap(),
            "1970-01-01T00:00:02Z\tthree\n"
        );
    }
}
