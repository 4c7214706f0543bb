// ---------------------------------------------------------------------------
// Search Orchestrator
// ---------------------------------------------------------------------------
//
// Combined search over the three collection sources. A term change arms a
// debounce timer; the timer firing runs the pipeline: empty-term short
// circuit, bounded result-cache lookup, then a concurrent fan-out joined
// across all sources. Entering a new term while debouncing or in flight
// cancels the pending timer/request through the coordinator slot. Every
// non-empty, non-cache-hit search lands in history, popularity, and stats.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::kv::KvStore;
use crate::search::history::SearchLog;
use crate::search::result_cache::{CachedSearch, ResultCache, SearchKey, SEARCH_CACHE_CAPACITY};
use crate::search::CollectionSource;
use crate::sync::coordinator::RequestCoordinator;
use crate::types::{QueryParams, SearchHit, SearchState};

/// Number of suggestions returned for a prefix.
const SUGGESTION_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// How long input must stay unchanged before a search fires.
    pub debounce: Duration,
    /// Per-collection page size for combined searches.
    pub source_limit: u32,
    /// Capacity of the bounded result cache.
    pub cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            source_limit: 20,
            cache_capacity: SEARCH_CACHE_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// SearchOrchestrator
// ---------------------------------------------------------------------------

struct SearchInner {
    cache: ResultCache,
    log: SearchLog,
}

pub struct SearchOrchestrator {
    sources: Vec<Arc<dyn CollectionSource>>,
    config: SearchConfig,
    coordinator: RequestCoordinator,
    inner: Mutex<SearchInner>,
    state_tx: watch::Sender<SearchState>,
}

impl SearchOrchestrator {
    pub fn new(
        sources: Vec<Arc<dyn CollectionSource>>,
        kv: Arc<dyn KvStore>,
        config: SearchConfig,
    ) -> Arc<Self> {
        let log = SearchLog::load(kv);
        let cache = ResultCache::new(config.cache_capacity);
        let initial = SearchState {
            search_history: log.history().to_vec(),
            popular_searches: log.popular(),
            search_stats: log.stats(),
            ..SearchState::default()
        };
        let (state_tx, _) = watch::channel(initial);
        Arc::new(Self {
            sources,
            config,
            coordinator: RequestCoordinator::new(),
            inner: Mutex::new(SearchInner { cache, log }),
            state_tx,
        })
    }

    /// Current state snapshot.
    pub fn state(&self) -> SearchState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state_tx.subscribe()
    }

    /// Update the live term and restart the debounce window. A pending
    /// timer or in-flight search for the previous term is cancelled.
    pub fn set_search_term(self: &Arc<Self>, term: impl Into<String>) {
        let term = term.into();
        self.state_tx.send_modify(|s| s.term = term.clone());

        let (token, generation) = self.coordinator.begin();
        let orchestrator = Arc::clone(self);
        let debounce = self.config.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            orchestrator.run_search(&term, &token, generation).await;
        });
    }

    /// Replace the active filter set. Takes effect on the next search.
    pub fn set_filters(&self, filters: BTreeMap<String, String>) {
        self.state_tx.send_modify(|s| s.filters = filters);
    }

    /// Run a search immediately, bypassing the debounce window.
    pub async fn execute_search(
        &self,
        term: &str,
        filters: Option<BTreeMap<String, String>>,
    ) -> SearchState {
        self.state_tx.send_modify(|s| {
            s.term = term.to_string();
            if let Some(filters) = filters {
                s.filters = filters;
            }
        });
        let (token, generation) = self.coordinator.begin();
        self.run_search(term, &token, generation).await;
        self.state()
    }

    /// Cancel anything pending and reset term and results.
    pub fn clear_search(&self) {
        self.coordinator.cancel();
        self.state_tx.send_modify(|s| {
            s.term.clear();
            s.results.clear();
            s.total_results = 0;
            s.is_searching = false;
            s.error = None;
        });
    }

    pub fn clear_filters(&self) {
        self.state_tx.send_modify(|s| s.filters.clear());
    }

    /// Suggestions for a prefix: case-insensitive substring matches over
    /// the sources' cached names, falling back to recent history and
    /// popular terms when the prefix is empty.
    pub fn suggestions(&self, prefix: &str) -> Vec<String> {
        let needle = prefix.trim().to_lowercase();
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        if needle.is_empty() {
            let inner = self.inner.lock().unwrap();
            let popular = inner.log.popular();
            for term in inner.log.history().iter().chain(popular.iter()) {
                if seen.insert(term.to_lowercase()) {
                    out.push(term.clone());
                }
                if out.len() == SUGGESTION_LIMIT {
                    break;
                }
            }
            return out;
        }

        'sources: for source in &self.sources {
            for name in source.cached_names() {
                if name.to_lowercase().contains(&needle) && seen.insert(name.to_lowercase()) {
                    out.push(name);
                    if out.len() == SUGGESTION_LIMIT {
                        break 'sources;
                    }
                }
            }
        }
        out
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    async fn run_search(&self, term: &str, token: &CancellationToken, generation: u64) {
        let trimmed = term.trim().to_string();
        if trimmed.is_empty() {
            // Empty search clears results without touching the network.
            self.state_tx.send_modify(|s| {
                s.results.clear();
                s.total_results = 0;
                s.is_searching = false;
                s.error = None;
            });
            return;
        }

        let filters = self.state_tx.borrow().filters.clone();
        let key = SearchKey::new(&trimmed, &filters);

        let hit = {
            let mut inner = self.inner.lock().unwrap();
            let hit = inner.cache.get(&key).cloned();
            if hit.is_some() {
                inner.log.record_cache_hit();
            }
            hit
        };
        if let Some(cached) = hit {
            tracing::debug!(term = %trimmed, "Search served from cache");
            self.publish_settled(cached.results, cached.total, None);
            return;
        }

        self.state_tx.send_modify(|s| {
            s.is_searching = true;
            s.error = None;
        });

        let queries = self.sources.iter().map(|source| {
            let params = QueryParams {
                search: Some(trimmed.clone()),
                filters: filters.clone(),
                page: Some(1),
                limit: Some(self.config.source_limit),
                ..QueryParams::default()
            };
            let source = Arc::clone(source);
            async move { (source.collection(), source.fetch(params).await) }
        });
        let outcomes = tokio::select! {
            _ = token.cancelled() => return,
            outcomes = futures::future::join_all(queries) => outcomes,
        };

        // A newer term may have taken the slot while the fan-out ran.
        if !self.coordinator.is_current(generation) {
            return;
        }

        let mut results = Vec::new();
        let mut total: u64 = 0;
        let mut failures = 0usize;
        for (collection, outcome) in outcomes {
            match outcome {
                Ok(hits) => {
                    total += hits.total;
                    results.extend(
                        hits.items
                            .into_iter()
                            .map(|item| SearchHit { collection, item }),
                    );
                }
                Err(e) => {
                    failures += 1;
                    if !e.is_cancelled() {
                        tracing::warn!(%collection, "Search source failed: {}", e);
                    }
                }
            }
        }

        if failures == self.sources.len() && !self.sources.is_empty() {
            self.publish_settled(
                Vec::new(),
                0,
                Some("search failed across all collections".to_string()),
            );
            return;
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.cache.put(
                key,
                CachedSearch {
                    results: results.clone(),
                    total,
                },
            );
            inner.log.record(&trimmed);
        }
        tracing::debug!(term = %trimmed, total, "Search settled");
        self.publish_settled(results, total, None);
    }

    fn publish_settled(&self, results: Vec<SearchHit>, total: u64, error: Option<String>) {
        let (history, popular, stats) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.log.history().to_vec(),
                inner.log.popular(),
                inner.log.stats(),
            )
        };
        self.state_tx.send_modify(|s| {
            s.results = results;
            s.total_results = total;
            s.is_searching = false;
            s.error = error;
            s.search_history = history;
            s.popular_searches = popular;
            s.search_stats = stats;
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
