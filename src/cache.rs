use crate::domain::Profile;
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
    profile: Profile,
    expires_at: Instant,
}

/// In-memory profile store with per-entry TTL.
///
/// Lookup of an expired entry behaves identically to a miss and evicts the
/// stale entry (lazy expiry, no background sweeper). Writes are idempotent
/// overwrites. The single lock makes get/put on one key atomic, so
/// concurrent resolutions never observe a torn entry.
#[derive(Clone)]
pub struct ProfileCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get(&self, key: &str) -> Option<Profile> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                counter!("cache_hits_total").increment(1);
                Some(entry.profile.clone())
            }
            Some(_) => {
                debug!(key, "Evicting expired cache entry");
                entries.remove(key);
                counter!("cache_misses_total").increment(1);
                None
            }
            None => {
                counter!("cache_misses_total").increment(1);
                None
            }
        }
    }

    pub fn put(&self, key: &str, profile: Profile, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            CacheEntry {
                profile,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubjectHint;

    fn profile() -> Profile {
        Profile::empty(SubjectHint::person("jane@initech.com", "Jane Doe"))
    }

    #[test]
    fn hit_within_ttl() {
        let cache = ProfileCache::new();
        cache.put("k", profile(), Duration::from_secs(60));
        assert!(cache.get("k").is_some());
    }

    #[test]
    fn expired_entry_is_a_miss_and_gets_evicted() {
        let cache = ProfileCache::new();
        cache.put("k", profile(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn put_overwrites_instead_of_duplicating() {
        let cache = ProfileCache::new();
        cache.put("k", profile(), Duration::from_secs(60));
        let mut updated = profile();
        updated.opted_out = true;
        cache.put("k", updated, Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k").unwrap().opted_out);
    }
}
