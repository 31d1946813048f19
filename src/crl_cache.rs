//! Coalescing CRL cache.
//!
//! CRLs are the one piece of mutable state shared across concurrent checks
//! and across inspection runs. Entries live until the CRL's own nextUpdate
//! instant and never past it. When two checks race on the same URL, the
//! second caller waits for the in-flight fetch and reuses its result instead
//! of issuing a duplicate request.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::SystemTime;

use lazy_static::lazy_static;

use crate::error::InspectionError;

lazy_static! {
    /// Process-wide default instance shared by all inspectors that do not
    /// inject their own cache.
    pub static ref DEFAULT_CRL_CACHE: Arc<CrlCache> = Arc::new(CrlCache::new());
}

enum Slot {
    /// A fetch for this URL is running on some thread
    InFlight,
    Ready {
        bytes: Arc<Vec<u8>>,
        /// CRL nextUpdate; entries past this instant are refetched
        expires_at: Option<SystemTime>,
    },
}

enum Lookup {
    Fresh(Arc<Vec<u8>>),
    Wait,
    Fetch,
}

/// Cache keyed by CRL URL. Injectable so tests can drive it with
/// deterministic fetchers.
pub struct CrlCache {
    slots: Mutex<HashMap<String, Slot>>,
    cond: Condvar,
}

impl Default for CrlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CrlCache {
    pub fn new() -> CrlCache {
        CrlCache {
            slots: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
        }
    }

    /// Returns the cached bytes for `url`, or runs `fetch` to fill the slot.
    ///
    /// `fetch` returns the raw CRL bytes plus the instant they expire
    /// (the CRL's nextUpdate). Concurrent callers for the same URL are
    /// coalesced: exactly one runs `fetch`, the rest block until it settles.
    /// A failed fetch empties the slot so the next caller retries.
    pub fn lookup_or_fetch<F>(
        &self,
        url: &str,
        fetch: F,
    ) -> Result<Arc<Vec<u8>>, InspectionError>
    where
        F: FnOnce() -> Result<(Vec<u8>, Option<SystemTime>), InspectionError>,
    {
        let mut slots = lock(&self.slots);
        loop {
            let decision = match slots.get(url) {
                Some(Slot::Ready { bytes, expires_at }) => {
                    let stale = matches!(expires_at, Some(at) if *at <= SystemTime::now());
                    if stale {
                        Lookup::Fetch
                    } else {
                        Lookup::Fresh(Arc::clone(bytes))
                    }
                }
                Some(Slot::InFlight) => Lookup::Wait,
                None => Lookup::Fetch,
            };

            match decision {
                Lookup::Fresh(bytes) => return Ok(bytes),
                Lookup::Wait => {
                    slots = wait(&self.cond, slots);
                }
                Lookup::Fetch => {
                    slots.insert(url.to_string(), Slot::InFlight);
                    break;
                }
            }
        }
        drop(slots);

        let outcome = fetch();

        let mut slots = lock(&self.slots);
        let result = match outcome {
            Ok((bytes, expires_at)) => {
                let bytes = Arc::new(bytes);
                slots.insert(
                    url.to_string(),
                    Slot::Ready {
                        bytes: Arc::clone(&bytes),
                        expires_at,
                    },
                );
                Ok(bytes)
            }
            Err(e) => {
                slots.remove(url);
                Err(e)
            }
        };
        drop(slots);
        self.cond.notify_all();
        result
    }

    /// Number of resident entries, in-flight slots included.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        lock(&self.slots).clear();
        self.cond.notify_all();
    }
}

fn lock<'a>(slots: &'a Mutex<HashMap<String, Slot>>) -> MutexGuard<'a, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn wait<'a>(
    cond: &Condvar,
    guard: MutexGuard<'a, HashMap<String, Slot>>,
) -> MutexGuard<'a, HashMap<String, Slot>> {
    cond.wait(guard)
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_hit_does_not_refetch() {
        let cache = CrlCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let bytes = cache
                .lookup_or_fetch("http://crl.example/a.crl", || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok((vec![1, 2, 3], None))
                })
                .unwrap();
            assert_eq!(*bytes, vec![1, 2, 3]);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_entry_triggers_fresh_fetch() {
        let cache = CrlCache::new();
        let fetches = AtomicUsize::new(0);
        let past = SystemTime::now() - Duration::from_secs(60);

        let fetch = |payload: Vec<u8>| {
            let fetches = &fetches;
            move || {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok((payload, Some(past)))
            }
        };

        cache
            .lookup_or_fetch("http://crl.example/a.crl", fetch(vec![1]))
            .unwrap();
        // Entry expired the moment it landed, so this must refetch
        let bytes = cache
            .lookup_or_fetch("http://crl.example/a.crl", fetch(vec![2]))
            .unwrap();

        assert_eq!(*bytes, vec![2]);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_fetch_empties_slot() {
        let cache = CrlCache::new();

        let err = cache
            .lookup_or_fetch("http://crl.example/a.crl", || {
                Err(InspectionError::connection("unreachable"))
            })
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connection);
        assert!(cache.is_empty());

        // Next caller retries and succeeds
        let bytes = cache
            .lookup_or_fetch("http://crl.example/a.crl", || Ok((vec![9], None)))
            .unwrap();
        assert_eq!(*bytes, vec![9]);
    }

    #[test]
    fn test_clear_drops_entries_and_forces_refetch() {
        let cache = CrlCache::new();
        let fetches = AtomicUsize::new(0);

        let fetch = || {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok((vec![5], None))
        };

        cache
            .lookup_or_fetch("http://crl.example/a.crl", fetch)
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());

        // The entry had no expiry, so only the clear explains a second fetch
        cache
            .lookup_or_fetch("http://crl.example/a.crl", fetch)
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_lookups_coalesce_into_one_fetch() {
        let cache = Arc::new(CrlCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let fetches = Arc::clone(&fetches);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .lookup_or_fetch("http://crl.example/shared.crl", || {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            // Hold the fetch open long enough for the other
                            // threads to pile up on the in-flight slot
                            std::thread::sleep(Duration::from_millis(100));
                            Ok((vec![7], None))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(*handle.join().unwrap(), vec![7]);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
