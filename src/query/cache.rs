use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::query::ast::Filter;
use crate::query::parser::parse_filter;

/// Parsed filters keyed by their source text.
pub struct FilterCache {
    cache: Mutex<LruCache<String, Option<Filter>>>,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
}

impl FilterCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        FilterCache {
            cache: Mutex::new(LruCache::new(cap)),
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    /// Parse errors are not cached.
    pub fn get_or_parse(&self, text: &str) -> Result<Option<Filter>> {
        let key = text.trim();
        if let Some(filter) = self.cache.lock().get(key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(filter.clone());
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let filter = parse_filter(key)?;
        self.cache.lock().put(key.to_string(), filter.clone());
        Ok(filter)
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
}
