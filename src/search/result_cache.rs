// ---------------------------------------------------------------------------
// Search Result Cache
// ---------------------------------------------------------------------------
//
// Bounded cache of aggregate search results keyed by (term, filters).
// Eviction is oldest-first by insertion order — a lookup does not refresh
// an entry's position. Memory-only; reset on restart.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::types::SearchHit;

/// Default capacity of the search result cache.
pub const SEARCH_CACHE_CAPACITY: usize = 50;

/// Cache key: normalized term plus the exact filter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    term: String,
    filters: BTreeMap<String, String>,
}

impl SearchKey {
    pub fn new(term: &str, filters: &BTreeMap<String, String>) -> Self {
        Self {
            term: term.trim().to_lowercase(),
            filters: filters.clone(),
        }
    }
}

/// One cached aggregate result.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub results: Vec<SearchHit>,
    pub total: u64,
}

pub struct ResultCache {
    capacity: usize,
    /// Insertion order, oldest first.
    order: VecDeque<SearchKey>,
    entries: HashMap<SearchKey, CachedSearch>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &SearchKey) -> Option<&CachedSearch> {
        self.entries.get(key)
    }

    /// Insert an aggregate, evicting the oldest entries beyond capacity.
    /// Re-inserting an existing key replaces the value but keeps its age.
    pub fn put(&mut self, key: SearchKey, value: CachedSearch) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(SEARCH_CACHE_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(term: &str) -> SearchKey {
        SearchKey::new(term, &BTreeMap::new())
    }

    fn cached(total: u64) -> CachedSearch {
        CachedSearch {
            results: Vec::new(),
            total,
        }
    }

    #[test]
    fn put_and_get() {
        let mut cache = ResultCache::new(10);
        cache.put(key("bakery"), cached(3));
        assert_eq!(cache.get(&key("bakery")).unwrap().total, 3);
        assert!(cache.get(&key("plumber")).is_none());
    }

    #[test]
    fn key_normalizes_term_case_and_padding() {
        let mut cache = ResultCache::new(10);
        cache.put(key("  Bakery "), cached(3));
        assert!(cache.get(&key("bakery")).is_some());
    }

    #[test]
    fn distinct_filters_are_distinct_keys() {
        let mut filters = BTreeMap::new();
        filters.insert("city".to_string(), "reno".to_string());

        let mut cache = ResultCache::new(10);
        cache.put(key("bakery"), cached(1));
        cache.put(SearchKey::new("bakery", &filters), cached(2));

        assert_eq!(cache.get(&key("bakery")).unwrap().total, 1);
        assert_eq!(cache.get(&SearchKey::new("bakery", &filters)).unwrap().total, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicts_oldest_first_past_capacity() {
        let mut cache = ResultCache::new(50);
        for i in 0..51 {
            cache.put(key(&format!("term-{i}")), cached(i));
        }

        assert_eq!(cache.len(), 50);
        assert!(cache.get(&key("term-0")).is_none());
        assert!(cache.get(&key("term-1")).is_some());
        assert!(cache.get(&key("term-50")).is_some());
    }

    #[test]
    fn replacing_a_key_keeps_its_age() {
        let mut cache = ResultCache::new(2);
        cache.put(key("a"), cached(1));
        cache.put(key("b"), cached(2));
        cache.put(key("a"), cached(9));
        cache.put(key("c"), cached(3));

        // "a" kept its original (oldest) position, so it was evicted.
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }
}
