//! Identity cache for metadata lookups.
//!
//! Maps a normalized (title, platform) pair to the resolved canonical identity,
//! including explicit "no match" results so failed lookups are not repeated.
//! The cache is shared between concurrent lookups and persisted through a [`CacheStore`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::analyzer::normalize_title;
use crate::platform::normalize_extension;

/// Cache key: normalized title and platform hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub title: String,
    pub platform: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(title: &str, platform: &str) -> Self {
        let platform = normalize_extension(platform);
        Self {
            title: normalize_title(title),
            platform: if platform.is_empty() { "unknown".to_string() } else { platform },
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.title, self.platform)
    }
}

/// A memoized lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Resolved canonical title, `None` for a cached "no match".
    pub canonical: Option<String>,
    pub alternative_names: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn matched(canonical: impl Into<String>, alternative_names: Vec<String>) -> Self {
        Self {
            canonical: Some(canonical.into()),
            alternative_names,
            cached_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn no_match() -> Self {
        Self {
            canonical: None,
            alternative_names: Vec::new(),
            cached_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn is_no_match(&self) -> bool {
        self.canonical.is_none()
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.canonical {
            Some(canonical) if self.alternative_names.is_empty() => write!(f, "{canonical}"),
            Some(canonical) => write!(f, "{canonical} ({})", self.alternative_names.join(", ")),
            None => write!(f, "<no match>"),
        }
    }
}

/// Persistent storage for cache entries.
pub trait CacheStore {
    /// Load all stored entries.
    fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>>;

    /// Insert or replace the given entries.
    fn save(&self, entries: &[(CacheKey, CacheEntry)]) -> Result<()>;
}

/// In-memory identity cache shared between concurrent lookups.
///
/// Writes are last-writer-wins: entries are idempotent re-derivations of the same query.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    updated: Mutex<HashSet<CacheKey>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with entries that count as already persisted.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (CacheKey, CacheEntry)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            updated: Mutex::default(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or replace an entry and mark it for the next save.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        // Entry first: a save that drains the mark must see this value
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), entry);
        self.updated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(CacheKey, CacheEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Entries written since the last load or save, sorted by key.
    #[must_use]
    pub fn pending_updates(&self) -> Vec<(CacheKey, CacheEntry)> {
        let updated = self.updated.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = updated
            .iter()
            .filter_map(|key| entries.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        pending
    }

    /// Load entries from storage. Existing in-memory entries with the same key are replaced.
    ///
    /// Returns the number of loaded entries.
    pub fn load_from(&self, store: &impl CacheStore) -> Result<usize> {
        let loaded = store.load()?;
        let count = loaded.len();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(loaded);
        Ok(count)
    }

    /// Persist pending updates to storage.
    ///
    /// Entries written while saving stay pending for the next save.
    /// On failure the drained keys are marked pending again.
    /// Returns the number of saved entries.
    pub fn save_to(&self, store: &impl CacheStore) -> Result<usize> {
        let keys = std::mem::take(&mut *self.updated.lock().unwrap_or_else(PoisonError::into_inner));
        if keys.is_empty() {
            return Ok(0);
        }
        let mut pending: Vec<_> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            keys.iter()
                .filter_map(|key| entries.get(key).map(|entry| (key.clone(), entry.clone())))
                .collect()
        };
        pending.sort_by(|a, b| a.0.cmp(&b.0));

        if let Err(error) = store.save(&pending) {
            self.updated
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(keys);
            return Err(error);
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    use std::cell::RefCell;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemoryStore {
        rows: RefCell<Vec<(CacheKey, CacheEntry)>>,
        saves: RefCell<usize>,
    }

    impl CacheStore for MemoryStore {
        fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
            Ok(self.rows.borrow().clone())
        }

        fn save(&self, entries: &[(CacheKey, CacheEntry)]) -> Result<()> {
            *self.saves.borrow_mut() += 1;
            self.rows.borrow_mut().extend_from_slice(entries);
            Ok(())
        }
    }

    #[test]
    fn key_is_normalized() {
        let key = CacheKey::new("  Super   MARIO Bros. ", ".NES");
        assert_eq!(key.title, "super mario bros.");
        assert_eq!(key.platform, "nes");
        assert_eq!(key.to_string(), "super mario bros._nes");
        assert_eq!(CacheKey::new("Tetris", "").platform, "unknown");
    }

    #[test]
    fn put_and_get() {
        let cache = IdentityCache::new();
        let key = CacheKey::new("Biohazard", "iso");
        assert!(cache.get(&key).is_none());

        cache.put(key.clone(), CacheEntry::matched("Resident Evil", vec!["Biohazard".to_string()]));
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.canonical.as_deref(), Some("Resident Evil"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn no_match_is_cached() {
        let cache = IdentityCache::new();
        let key = CacheKey::new("Unknown Homebrew", "nes");
        cache.put(key.clone(), CacheEntry::no_match());
        let entry = cache.get(&key).unwrap();
        assert!(entry.is_no_match());
        assert_eq!(entry.to_string(), "<no match>");
    }

    #[test]
    fn last_writer_wins() {
        let cache = IdentityCache::new();
        let key = CacheKey::new("Rockman", "nes");
        cache.put(key.clone(), CacheEntry::no_match());
        cache.put(key.clone(), CacheEntry::matched("Mega Man", Vec::new()));
        assert_eq!(cache.get(&key).unwrap().canonical.as_deref(), Some("Mega Man"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_writers_do_not_corrupt() {
        let cache = Arc::new(IdentityCache::new());
        let handles: Vec<_> = (0..8)
            .map(|thread| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = CacheKey::new(&format!("Game {}", i % 10), "nes");
                        cache.put(key, CacheEntry::matched(format!("Game {thread}"), Vec::new()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.pending_updates().len(), 10);
    }

    #[test]
    fn loaded_entries_are_not_pending() {
        let store = MemoryStore::default();
        store
            .rows
            .borrow_mut()
            .push((CacheKey::new("Biohazard", "iso"), CacheEntry::matched("Resident Evil", Vec::new())));

        let cache = IdentityCache::new();
        assert_eq!(cache.load_from(&store).unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.pending_updates().is_empty());
        assert_eq!(cache.save_to(&store).unwrap(), 0);
        assert_eq!(*store.saves.borrow(), 0);
    }

    #[test]
    fn save_persists_only_updates_once() {
        let store = MemoryStore::default();
        let cache = IdentityCache::from_entries([(CacheKey::new("Contra", "nes"), CacheEntry::no_match())]);
        cache.put(CacheKey::new("Rockman", "nes"), CacheEntry::matched("Mega Man", Vec::new()));

        assert_eq!(cache.save_to(&store).unwrap(), 1);
        assert_eq!(store.rows.borrow().len(), 1);
        assert_eq!(store.rows.borrow()[0].0.title, "rockman");

        assert_eq!(cache.save_to(&store).unwrap(), 0);
        assert_eq!(*store.saves.borrow(), 1);
    }

    /// Writes a newer entry into the cache while a save is in progress.
    struct RewritingStore<'a> {
        cache: &'a IdentityCache,
        rows: RefCell<Vec<(CacheKey, CacheEntry)>>,
    }

    impl CacheStore for RewritingStore<'_> {
        fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
            Ok(self.rows.borrow().clone())
        }

        fn save(&self, entries: &[(CacheKey, CacheEntry)]) -> Result<()> {
            if self.rows.borrow().is_empty() {
                self.cache
                    .put(CacheKey::new("Rockman", "nes"), CacheEntry::matched("Mega Man", Vec::new()));
            }
            self.rows.borrow_mut().extend_from_slice(entries);
            Ok(())
        }
    }

    /// Always fails to save.
    struct FailingStore;

    impl CacheStore for FailingStore {
        fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
            Ok(Vec::new())
        }

        fn save(&self, _entries: &[(CacheKey, CacheEntry)]) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn update_during_save_stays_pending() {
        let cache = IdentityCache::new();
        cache.put(CacheKey::new("Rockman", "nes"), CacheEntry::no_match());
        let store = RewritingStore {
            cache: &cache,
            rows: RefCell::new(Vec::new()),
        };

        assert_eq!(cache.save_to(&store).unwrap(), 1);
        assert!(store.rows.borrow()[0].1.is_no_match());

        let pending = cache.pending_updates();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.canonical.as_deref(), Some("Mega Man"));

        assert_eq!(cache.save_to(&store).unwrap(), 1);
        assert_eq!(store.rows.borrow()[1].1.canonical.as_deref(), Some("Mega Man"));
        assert!(cache.pending_updates().is_empty());
    }

    #[test]
    fn failed_save_keeps_updates_pending() {
        let cache = IdentityCache::new();
        cache.put(CacheKey::new("Biohazard", "iso"), CacheEntry::matched("Resident Evil", Vec::new()));

        assert!(cache.save_to(&FailingStore).is_err());
        assert_eq!(cache.pending_updates().len(), 1);
    }

    #[test]
    fn entries_are_sorted() {
        let cache = IdentityCache::new();
        cache.put(CacheKey::new("Zelda", "nes"), CacheEntry::no_match());
        cache.put(CacheKey::new("Contra", "nes"), CacheEntry::no_match());
        let titles: Vec<_> = cache.entries().into_iter().map(|(key, _)| key.title).collect();
        assert_eq!(titles, vec!["contra", "zelda"]);
    }
}
