// ---------------------------------------------------------------------------
// Search History & Popularity
// ---------------------------------------------------------------------------
//
// Bounded most-recent-first history, unbounded popularity counts with a
// top-N surface, and aggregate stats. Everything is persisted best-effort
// through the injected key-value store; a write failure never reaches
// foreground search state.
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::kv::KvStore;
use crate::types::SearchStats;

/// Maximum number of history entries kept.
pub const HISTORY_CAPACITY: usize = 10;
/// Number of popular terms surfaced.
pub const POPULAR_LIMIT: usize = 10;

const HISTORY_KEY: &str = "plaza.search.history";
const POPULARITY_KEY: &str = "plaza.search.popularity";
const STATS_KEY: &str = "plaza.search.stats";

pub struct SearchLog {
    kv: Arc<dyn KvStore>,
    history: Vec<String>,
    popularity: HashMap<String, u64>,
    stats: SearchStats,
}

impl SearchLog {
    /// Load persisted history, popularity, and stats; unreadable values
    /// start over empty.
    pub fn load(kv: Arc<dyn KvStore>) -> Self {
        let history = read_json(kv.as_ref(), HISTORY_KEY).unwrap_or_default();
        let popularity = read_json(kv.as_ref(), POPULARITY_KEY).unwrap_or_default();
        let stats = read_json(kv.as_ref(), STATS_KEY).unwrap_or_default();
        Self {
            kv,
            history,
            popularity,
            stats,
        }
    }

    /// Record a term that actually hit the network: history (deduplicated,
    /// most-recent-first, capped), popularity count, and stats.
    pub fn record(&mut self, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        let lowered = term.to_lowercase();

        self.history.retain(|t| t.to_lowercase() != lowered);
        self.history.insert(0, term.to_string());
        self.history.truncate(HISTORY_CAPACITY);

        *self.popularity.entry(lowered).or_insert(0) += 1;
        self.stats.total_searches += 1;
        self.persist();
    }

    /// Count a search answered from the result cache.
    pub fn record_cache_hit(&mut self) {
        self.stats.cache_hits += 1;
        write_json(self.kv.as_ref(), STATS_KEY, &self.stats);
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Top terms by count, ties broken alphabetically for stable output.
    pub fn popular(&self) -> Vec<String> {
        let mut ranked: Vec<(&String, &u64)> = self.popularity.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(POPULAR_LIMIT)
            .map(|(term, _)| term.clone())
            .collect()
    }

    pub fn stats(&self) -> SearchStats {
        self.stats.clone()
    }

    fn persist(&self) {
        write_json(self.kv.as_ref(), HISTORY_KEY, &self.history);
        write_json(self.kv.as_ref(), POPULARITY_KEY, &self.popularity);
        write_json(self.kv.as_ref(), STATS_KEY, &self.stats);
    }
}

fn read_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Option<T> {
    let raw = kv.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, "Discarding unreadable persisted value: {}", e);
            None
        }
    }
}

fn write_json<T: Serialize>(kv: &dyn KvStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => kv.set(key, &raw),
        Err(e) => tracing::warn!(key, "Failed to serialize persisted value: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn fresh() -> SearchLog {
        SearchLog::load(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn history_keeps_the_ten_most_recent() {
        let mut log = fresh();
        for i in 1..=11 {
            log.record(&format!("term-{i}"));
        }

        assert_eq!(log.history().len(), 10);
        assert_eq!(log.history()[0], "term-11");
        assert_eq!(log.history()[9], "term-2");
        assert!(!log.history().contains(&"term-1".to_string()));
    }

    #[test]
    fn history_dedupes_case_insensitively() {
        let mut log = fresh();
        log.record("Bakery");
        log.record("plumber");
        log.record("bakery");

        assert_eq!(log.history(), &["bakery", "plumber"][..]);
    }

    #[test]
    fn empty_terms_are_ignored() {
        let mut log = fresh();
        log.record("   ");
        assert!(log.history().is_empty());
        assert_eq!(log.stats().total_searches, 0);
    }

    #[test]
    fn popularity_ranks_by_count_then_name() {
        let mut log = fresh();
        log.record("bakery");
        log.record("bakery");
        log.record("Bakery");
        log.record("plumber");
        log.record("plumber");
        log.record("cafe");

        let popular = log.popular();
        assert_eq!(popular[0], "bakery");
        assert_eq!(popular[1], "plumber");
        assert_eq!(popular[2], "cafe");
    }

    #[test]
    fn popular_surfaces_at_most_ten_terms() {
        let mut log = fresh();
        for i in 0..15 {
            log.record(&format!("term-{i:02}"));
        }
        assert_eq!(log.popular().len(), POPULAR_LIMIT);
    }

    #[test]
    fn stats_count_searches_and_cache_hits() {
        let mut log = fresh();
        log.record("bakery");
        log.record("plumber");
        log.record_cache_hit();

        let stats = log.stats();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn state_survives_a_reload() {
        let kv = Arc::new(MemoryStore::new());

        let mut log = SearchLog::load(kv.clone());
        log.record("bakery");
        log.record("plumber");
        log.record_cache_hit();
        drop(log);

        let reloaded = SearchLog::load(kv);
        assert_eq!(reloaded.history(), &["plumber", "bakery"][..]);
        assert_eq!(reloaded.stats().total_searches, 2);
        assert_eq!(reloaded.stats().cache_hits, 1);
        assert_eq!(reloaded.popular().len(), 2);
    }
}
