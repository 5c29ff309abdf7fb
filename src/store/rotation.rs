use std::fs::{self, File};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};

use crate::error::Result;

use super::LogStore;

/// An archived log, written once at rotation time and never touched again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRecord {
    pub name: String,
    pub archive: PathBuf,
    pub size: u64,
}

/// Archives logs that grew past a size threshold.
pub struct RotationPolicy {
    store: LogStore,
}

impl RotationPolicy {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    /// Archives `name` and starts an empty log if it is larger than `max_size` bytes.
    ///
    /// Runs under the feed's lock, so no append can land between the rename
    /// and the creation of the fresh file. The fresh file's modification time
    /// is reset to the epoch: its watermark starts over and does not carry
    /// across the rotation.
    pub fn maybe_rotate(&self, name: &str, max_size: u64) -> Result<Option<RotationRecord>> {
        self.rotate_at(name, max_size, Utc::now())
    }

    fn rotate_at(
        &self,
        name: &str,
        max_size: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<RotationRecord>> {
        let path = self.store.path_of(name);

        self.store.locks().with(name, || -> Result<Option<RotationRecord>> {
            let size = self.store.size_of(name)?;
            if size <= max_size {
                return Ok(None);
            }

            let archive = self.archive_path(name, now);
            fs::rename(&path, &archive)?;

            let fresh = File::create(&path)?;
            fresh.set_modified(UNIX_EPOCH)?;

            tracing::info!(
                "Rotated {} with size {} > {} to {}",
                name,
                human_bytes(size),
                human_bytes(max_size),
                archive.display()
            );

            Ok(Some(RotationRecord {
                name: name.to_string(),
                archive,
                size,
            }))
        })
    }

    /// Checks every log in the store. One failing log does not stop the others.
    pub fn rotate_all(&self, max_size: u64) -> Result<Vec<RotationRecord>> {
        let mut rotated = Vec::new();
        for name in self.store.list_all()? {
            match self.maybe_rotate(&name, max_size) {
                Ok(Some(record)) => rotated.push(record),
                Ok(None) => {}
                Err(e) => tracing::error!("Failed to rotate {}: {}", name, e),
            }
        }
        Ok(rotated)
    }

    fn archive_path(&self, name: &str, now: DateTime<Utc>) -> PathBuf {
        let base = format!(
            "{}.{}",
            self.store.path_of(name).display(),
            now.format("%Y%m%dT%H%M%SZ")
        );
        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}.{}", base, n));
            n += 1;
        }
        candidate
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLine;
    use crate::store::Watermark;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store_with_lines(dir: &TempDir, name: &str, count: usize) -> LogStore {
        let store = LogStore::new(dir.path()).unwrap();
        for i in 0..count {
            let ts = Utc.timestamp_opt(i as i64, 0).unwrap();
            store.append(name, &LogLine::new(ts, &format!("line {}", i))).unwrap();
        }
        store
    }

    #[test]
    fn small_logs_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_with_lines(&dir, "news", 3);
        let before = store.read("news").unwrap();

        let policy = RotationPolicy::new(store.clone());
        let size = store.size_of("news").unwrap();
        assert!(policy.maybe_rotate("news", size).unwrap().is_none());
        assert_eq!(store.read("news").unwrap(), before);
    }

    #[test]
    fn oversized_log_is_archived_without_losing_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_with_lines(&dir, "news", 10);
        let before = store.read("news").unwrap().unwrap();

        let policy = RotationPolicy::new(store.clone());
        let record = policy.maybe_rotate("news", 100).unwrap().unwrap();

        assert_eq!(record.size, before.len() as u64);
        assert_eq!(fs::read_to_string(&record.archive).unwrap(), before);
        assert_eq!(store.read("news").unwrap().as_deref(), Some(""));
        assert!(store.size_of("news").unwrap() <= 100);
        assert_eq!(
            store.watermark_of("news").unwrap(),
            Watermark::At(DateTime::<Utc>::UNIX_EPOCH)
        );
    }

    #[test]
    fn appends_after_rotation_land_in_the_fresh_log() {
        let dir = TempDir::new().unwrap();
        let store = store_with_lines(&dir, "news", 10);
        let policy = RotationPolicy::new(store.clone());
        let record = policy.maybe_rotate("news", 100).unwrap().unwrap();

        let ts = Utc.timestamp_opt(100, 0).unwrap();
        store.append("news", &LogLine::new(ts, "after")).unwrap();

        let archived = fs::read_to_string(&record.archive).unwrap();
        let active = store.read("news").unwrap().unwrap();
        assert_eq!(archived.lines().count(), 10);
        assert_eq!(active, "1970-01-01T00:01:40Z\tafter\n");
    }

    #[test]
    fn archive_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = store_with_lines(&dir, "news", 10);
        let policy = RotationPolicy::new(store.clone());
        let now = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

        let first = policy.rotate_at("news", 100, now).unwrap().unwrap();
        for i in 0..10 {
            let ts = Utc.timestamp_opt(i, 0).unwrap();
            store.append("news", &LogLine::new(ts, "again")).unwrap();
        }
        let second = policy.rotate_at("news", 100, now).unwrap().unwrap();

        assert!(first.archive.ends_with("news.txt.20230101T000000Z"));
        assert!(second.archive.ends_with("news.txt.20230101T000000Z.1"));
        assert_eq!(store.list_all().unwrap(), vec!["news"]);
    }

    #[test]
    fn rotate_all_only_touches_large_logs() {
        let dir = TempDir::new().unwrap();
        let store = store_with_lines(&dir, "big", 10);
        store
            .append("small", &LogLine::new(Utc.timestamp_opt(0, 0).unwrap(), "x"))
            .unwrap();

        let rotated = RotationPolicy::new(store.clone()).rotate_all(100).unwrap();
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].name, "big");
        assert!(store.size_of("small").unwrap() > 0);
    }

    #[test]
    fn appends_racing_rotation_are_all_kept() {
        use std::collections::BTreeSet;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::thread;

        const WRITTEN: usize = 500;

        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path()).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = store.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..WRITTEN {
                    let ts = Utc.timestamp_opt(i as i64, 0).unwrap();
                    store.append("news", &LogLine::new(ts, &format!("line {}", i))).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let policy = RotationPolicy::new(store.clone());
        let mut rotations = 0;
        while !done.load(Ordering::SeqCst) {
            if policy.maybe_rotate("news", 200).unwrap().is_some() {
                rotations += 1;
            }
        }
        writer.join().unwrap();
        if policy.maybe_rotate("news", 200).unwrap().is_some() {
            rotations += 1;
        }
        assert!(rotations > 0);

        let mut seen = Vec::new();
        for entry in fs::read_dir(dir.path()).unwrap() {
            let path = entry.unwrap().path();
            let content = fs::read_to_string(&path).unwrap();
            seen.extend(content.lines().map(|l| LogLine::parse(l).unwrap().text));
        }

        let unique: BTreeSet<_> = seen.iter().cloned().collect();
        let expected: BTreeSet<_> = (0..WRITTEN).map(|i| format!("line {}", i)).collect();
        assert_eq!(seen.len(), WRITTEN);
        assert_eq!(unique, expected);
    }

    #[test]
    fn human_bytes_formats_units() {
        assert_eq!(human_bytes(999), "999 B");
        assert_eq!(human_bytes(1_500), "1.5 kB");
        assert_eq!(human_bytes(2_000_000), "2.0 MB");
    }
}
