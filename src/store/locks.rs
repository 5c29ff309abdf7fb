use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Keyed lock table: one exclusive lock per feed name.
///
/// Appends and rotations of the same feed serialize on its entry while
/// distinct feeds never contend. Entries are created on first use and kept
/// for the life of the process; the table is bounded by the number of feeds.
#[derive(Debug, Default)]
pub struct FeedLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FeedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock guarding `name`, creating it if needed.
    pub fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(name.to_string()).or_default())
    }

    /// Runs `f` while holding the exclusive lock for `name`.
    pub fn with<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.get(name);
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_name_shares_a_lock() {
        let locks = FeedLocks::new();
        assert!(Arc::ptr_eq(&locks.get("a"), &locks.get("a")));
        assert!(!Arc::ptr_eq(&locks.get("a"), &locks.get("b")));
    }

    #[test]
    fn critical_sections_for_one_feed_do_not_overlap() {
        let locks = Arc::new(FeedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with("feed", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
