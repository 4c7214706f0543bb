// ---------------------------------------------------------------------------
// Collection Store
// ---------------------------------------------------------------------------
//
// One store per collection (businesses, services, products). Composes the
// page cache, the request coordinator, the order randomizer, and the
// prefetcher into a single stateful struct, publishing a reactive
// CollectionState through a watch channel. Cache and state writes are
// committed only by the request that still owns the coordinator slot, so a
// superseded response can never overwrite a newer one.
// ---------------------------------------------------------------------------

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::api::DirectoryApi;
use crate::error::SyncError;
use crate::search::{CollectionSource, SourceHits};
use crate::sync::coordinator::RequestCoordinator;
use crate::sync::page_cache::PageCache;
use crate::sync::prefetch::Prefetcher;
use crate::sync::shuffle::shuffle_page;
use crate::types::{Collection, CollectionState, Item, QueryParams, DEFAULT_PAGE_LIMIT};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Page size applied when a fetch does not specify one.
    pub default_limit: u32,
    /// Whether to prefetch the next page after a successful fetch.
    pub prefetch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            prefetch: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CollectionStore
// ---------------------------------------------------------------------------

pub struct CollectionStore {
    collection: Collection,
    api: Arc<dyn DirectoryApi>,
    config: StoreConfig,
    cache: Arc<Mutex<PageCache>>,
    coordinator: RequestCoordinator,
    prefetcher: Prefetcher,
    state_tx: watch::Sender<CollectionState>,
}

impl CollectionStore {
    pub fn new(collection: Collection, api: Arc<dyn DirectoryApi>, config: StoreConfig) -> Self {
        let (state_tx, _) = watch::channel(CollectionState::default());
        let prefetcher = Prefetcher::new(config.prefetch);
        Self {
            collection,
            api,
            config,
            cache: Arc::new(Mutex::new(PageCache::new())),
            coordinator: RequestCoordinator::new(),
            prefetcher,
            state_tx,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> CollectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state_tx.subscribe()
    }

    /// Fetch one page. A cached page is published immediately while the
    /// refresh runs; the response then overwrites state, feeds the cache,
    /// and triggers a prefetch of the next page. Network and shape errors
    /// reset state to a safe empty default; an abort leaves state alone.
    pub async fn fetch(&self, params: QueryParams) -> Result<CollectionState, SyncError> {
        let mut params = params;
        if params.limit.is_none() {
            params.limit = Some(self.config.default_limit);
        }
        let page = params.page();
        let query = params.normalize();
        let fingerprint = params.fingerprint();

        let cached = self
            .cache
            .lock()
            .unwrap()
            .get(&fingerprint, page)
            .map(|entry| entry.items.clone());
        self.state_tx.send_modify(|state| {
            if let Some(items) = cached {
                state.items = items;
            }
            state.current_page = page;
            state.is_loading = true;
            state.error = None;
        });

        let (token, generation) = self.coordinator.begin();
        let result = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(collection = %self.collection, page, "Fetch superseded");
                return Ok(self.state());
            }
            result = self.api.list(self.collection, &query) => result,
        };

        // A newer fetch may have begun while the response was in flight.
        if !self.coordinator.is_current(generation) {
            return Ok(self.state());
        }

        match result {
            Ok(mut loaded) => {
                shuffle_page(&mut loaded.items);
                self.cache
                    .lock()
                    .unwrap()
                    .put(&fingerprint, page, loaded.items.clone());
                let has_next = loaded.has_next;
                self.state_tx.send_modify(|state| {
                    state.items = loaded.items;
                    state.total_count = loaded.total;
                    state.current_page = page;
                    state.has_next_page = loaded.has_next;
                    state.has_previous_page = loaded.has_previous;
                    state.is_loading = false;
                    state.error = None;
                });
                if has_next {
                    self.prefetcher.spawn(
                        self.api.clone(),
                        self.collection,
                        self.cache.clone(),
                        params.with_page(page + 1),
                    );
                }
                Ok(self.state())
            }
            Err(e) if e.is_cancelled() => Ok(self.state()),
            Err(e) => {
                tracing::warn!(collection = %self.collection, page, "Fetch failed: {}", e);
                self.state_tx.send_modify(|state| {
                    *state = CollectionState {
                        current_page: page,
                        error: Some(e.to_string()),
                        ..CollectionState::default()
                    };
                });
                Err(e)
            }
        }
    }

    /// Create an item; on success it is prepended to the current page.
    pub async fn create(&self, data: Value) -> Result<Item, SyncError> {
        match self.api.create(self.collection, data).await {
            Ok(item) => {
                self.state_tx.send_modify(|state| {
                    state.items.insert(0, item.clone());
                    state.total_count += 1;
                    state.error = None;
                });
                Ok(item)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Update an item. The local copy is patched before the server
    /// confirms; on failure the optimistic edit stays and only `error` is
    /// set.
    pub async fn update(&self, id: u64, data: Value) -> Result<Item, SyncError> {
        self.state_tx.send_modify(|state| {
            if let Some(item) = state.items.iter_mut().find(|i| i.id == id) {
                merge_fields(item, &data);
            }
        });

        match self.api.update(self.collection, id, data).await {
            Ok(updated) => {
                self.state_tx.send_modify(|state| {
                    if let Some(item) = state.items.iter_mut().find(|i| i.id == id) {
                        *item = updated.clone();
                    }
                    state.error = None;
                });
                Ok(updated)
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Delete an item. The local copy is removed before the server
    /// confirms; on failure the removal stays and only `error` is set.
    pub async fn delete(&self, id: u64) -> Result<(), SyncError> {
        self.state_tx.send_modify(|state| {
            let before = state.items.len();
            state.items.retain(|i| i.id != id);
            if state.items.len() < before {
                state.total_count = state.total_count.saturating_sub(1);
            }
        });

        match self.api.delete(self.collection, id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    fn record_error(&self, error: &SyncError) {
        if error.is_cancelled() {
            return;
        }
        self.state_tx
            .send_modify(|state| state.error = Some(error.to_string()));
    }
}

/// Apply a mutation payload onto a local item, the same merge the server
/// performs on a partial update.
fn merge_fields(item: &mut Item, data: &Value) {
    let Value::Object(map) = data else {
        return;
    };
    for (key, value) in map {
        match key.as_str() {
            "id" => {}
            "name" => {
                if let Some(name) = value.as_str() {
                    item.name = name.to_string();
                }
            }
            _ => {
                item.fields.insert(key.clone(), value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CollectionSource — the seam the search orchestrator fans out to
// ---------------------------------------------------------------------------

#[async_trait]
impl CollectionSource for CollectionStore {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn fetch(&self, params: QueryParams) -> Result<SourceHits, SyncError> {
        let state = CollectionStore::fetch(self, params).await?;
        Ok(SourceHits {
            items: state.items,
            total: state.total_count,
        })
    }

    fn cached_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for item in &self.state_tx.borrow().items {
            if !item.name.is_empty() && seen.insert(item.name.clone()) {
                names.push(item.name.clone());
            }
        }
        for entry in self.cache.lock().unwrap().entries() {
            for item in &entry.items {
                if !item.name.is_empty() && seen.insert(item.name.clone()) {
                    names.push(item.name.clone());
                }
            }
        }
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::types::ListPage;

    #[derive(Clone, Copy, PartialEq)]
    enum FailureMode {
        None,
        Malformed,
        Status,
    }

    /// Backend fake: a flat dataset sliced by offset/limit, with optional
    /// per-offset delays and a switchable failure mode.
    struct FakeApi {
        dataset: Mutex<Vec<Item>>,
        delays: Mutex<HashMap<u32, Duration>>,
        failure: Mutex<FailureMode>,
        list_calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(count: u64) -> Self {
            let dataset = (1..=count).map(item).collect();
            Self {
                dataset: Mutex::new(dataset),
                delays: Mutex::new(HashMap::new()),
                failure: Mutex::new(FailureMode::None),
                list_calls: AtomicUsize::new(0),
            }
        }

        fn delay(&self, offset: u32, delay: Duration) {
            self.delays.lock().unwrap().insert(offset, delay);
        }

        fn fail_with(&self, mode: FailureMode) {
            *self.failure.lock().unwrap() = mode;
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn error(mode: FailureMode) -> Option<SyncError> {
            match mode {
                FailureMode::None => None,
                FailureMode::Malformed => {
                    Some(SyncError::MalformedResponse("unexpected shape".to_string()))
                }
                FailureMode::Status => Some(SyncError::Status {
                    status: 500,
                    message: "server exploded".to_string(),
                }),
            }
        }
    }

    fn item(id: u64) -> Item {
        Item {
            id,
            name: format!("item-{id}"),
            fields: Default::default(),
        }
    }

    #[async_trait]
    impl DirectoryApi for FakeApi {
        async fn list(
            &self,
            _collection: Collection,
            query: &crate::types::RequestQuery,
        ) -> Result<ListPage, SyncError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().unwrap().get(&query.offset).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = Self::error(*self.failure.lock().unwrap()) {
                return Err(error);
            }

            let dataset = self.dataset.lock().unwrap();
            let offset = query.offset as usize;
            let page: Vec<Item> = dataset
                .iter()
                .skip(offset)
                .take(query.limit as usize)
                .cloned()
                .collect();
            Ok(ListPage {
                total: dataset.len() as u64,
                has_next: offset + page.len() < dataset.len(),
                has_previous: offset > 0,
                items: page,
            })
        }

        async fn create(&self, _collection: Collection, data: Value) -> Result<Item, SyncError> {
            if let Some(error) = Self::error(*self.failure.lock().unwrap()) {
                return Err(error);
            }
            let mut created = item(1000);
            merge_fields(&mut created, &data);
            self.dataset.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update(
            &self,
            _collection: Collection,
            id: u64,
            data: Value,
        ) -> Result<Item, SyncError> {
            if let Some(error) = Self::error(*self.failure.lock().unwrap()) {
                return Err(error);
            }
            let mut updated = item(id);
            merge_fields(&mut updated, &data);
            Ok(updated)
        }

        async fn delete(&self, _collection: Collection, _id: u64) -> Result<(), SyncError> {
            if let Some(error) = Self::error(*self.failure.lock().unwrap()) {
                return Err(error);
            }
            Ok(())
        }
    }

    fn store_over(api: Arc<FakeApi>) -> CollectionStore {
        CollectionStore::new(Collection::Businesses, api, StoreConfig::default())
    }

    fn sorted_ids(items: &[Item]) -> Vec<u64> {
        let mut ids: Vec<u64> = items.iter().map(|i| i.id).collect();
        ids.sort_unstable();
        ids
    }

    fn page_params(page: u32) -> QueryParams {
        QueryParams {
            page: Some(page),
            limit: Some(15),
            ..QueryParams::default()
        }
    }

    #[tokio::test]
    async fn empty_backend_yields_empty_state() {
        let api = Arc::new(FakeApi::new(0));
        let store = store_over(api);

        let state = store.fetch(page_params(1)).await.unwrap();
        assert!(state.items.is_empty());
        assert_eq!(state.total_count, 0);
        assert!(!state.has_next_page);
        assert!(!state.has_previous_page);
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn paginates_a_twenty_item_backend() {
        let api = Arc::new(FakeApi::new(20));
        let store = store_over(api);

        let first = store.fetch(page_params(1)).await.unwrap();
        assert_eq!(first.items.len(), 15);
        assert_eq!(first.total_count, 20);
        assert!(first.has_next_page);
        assert!(!first.has_previous_page);

        let second = store.fetch(page_params(2)).await.unwrap();
        assert_eq!(second.items.len(), 5);
        assert_eq!(sorted_ids(&second.items), vec![16, 17, 18, 19, 20]);
        assert!(!second.has_next_page);
        assert!(second.has_previous_page);
        assert_eq!(second.current_page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_fetch_never_commits() {
        let api = Arc::new(FakeApi::new(20));
        // Page 1 answers slowly, page 2 instantly.
        api.delay(0, Duration::from_millis(500));
        let store = Arc::new(store_over(api.clone()));

        let slow = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch(page_params(1)).await })
        };
        // Let the slow fetch get in flight before superseding it.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = store.fetch(page_params(2)).await.unwrap();
        assert_eq!(sorted_ids(&state.items), vec![16, 17, 18, 19, 20]);

        // The superseded call settles without touching state or error.
        let superseded = slow.await.unwrap().unwrap();
        assert_eq!(superseded.current_page, 2);
        assert_eq!(superseded.error, None);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let settled = store.state();
        assert_eq!(sorted_ids(&settled.items), vec![16, 17, 18, 19, 20]);
        assert_eq!(settled.current_page, 2);
        assert_eq!(settled.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_page_is_published_while_revalidating() {
        let api = Arc::new(FakeApi::new(20));
        let store = Arc::new(store_over(api.clone()));

        let first = store.fetch(page_params(1)).await.unwrap();
        let first_ids = sorted_ids(&first.items);

        // Slow down the refresh so the stale publication is observable.
        api.delay(0, Duration::from_millis(200));
        let refresh = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch(page_params(1)).await })
        };
        tokio::task::yield_now().await;

        let stale = store.state();
        assert_eq!(sorted_ids(&stale.items), first_ids);
        assert!(stale.is_loading);

        let refreshed = refresh.await.unwrap().unwrap();
        assert_eq!(sorted_ids(&refreshed.items), first_ids);
        assert!(!refreshed.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn prefetches_the_next_page_into_the_cache() {
        let api = Arc::new(FakeApi::new(20));
        let store = store_over(api.clone());

        store.fetch(page_params(1)).await.unwrap();
        // Let the background prefetch land.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(api.list_calls(), 2);
        let names = store.cached_names();
        assert!(names.contains(&"item-16".to_string()));
    }

    #[tokio::test]
    async fn prefetch_can_be_disabled() {
        let api = Arc::new(FakeApi::new(20));
        let store = CollectionStore::new(
            Collection::Businesses,
            api.clone(),
            StoreConfig {
                prefetch: false,
                ..StoreConfig::default()
            },
        );

        store.fetch(page_params(1)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn malformed_response_resets_to_safe_empty_state() {
        let api = Arc::new(FakeApi::new(20));
        let store = store_over(api.clone());

        store.fetch(page_params(1)).await.unwrap();
        api.fail_with(FailureMode::Malformed);

        let err = store.fetch(page_params(2)).await.unwrap_err();
        assert_eq!(err.code(), "MALFORMED_RESPONSE");

        let state = store.state();
        assert!(state.items.is_empty());
        assert_eq!(state.total_count, 0);
        assert!(!state.is_loading);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn success_clears_a_previous_error() {
        let api = Arc::new(FakeApi::new(5));
        let store = store_over(api.clone());

        api.fail_with(FailureMode::Status);
        store.fetch(page_params(1)).await.unwrap_err();
        assert!(store.state().error.is_some());

        api.fail_with(FailureMode::None);
        let state = store.fetch(page_params(1)).await.unwrap();
        assert_eq!(state.error, None);
        assert_eq!(state.items.len(), 5);
    }

    #[tokio::test]
    async fn create_prepends_the_new_item() {
        let api = Arc::new(FakeApi::new(5));
        let store = store_over(api);

        store.fetch(page_params(1)).await.unwrap();
        let created = store
            .create(serde_json::json!({"name": "Fresh Bakery"}))
            .await
            .unwrap();

        let state = store.state();
        assert_eq!(state.items[0].id, created.id);
        assert_eq!(state.items[0].name, "Fresh Bakery");
        assert_eq!(state.total_count, 6);
    }

    #[tokio::test]
    async fn update_applies_optimistically_and_keeps_edit_on_failure() {
        let api = Arc::new(FakeApi::new(5));
        let store = store_over(api.clone());

        store.fetch(page_params(1)).await.unwrap();
        api.fail_with(FailureMode::Status);

        let err = store
            .update(3, serde_json::json!({"name": "Renamed"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STATUS_ERROR");

        let state = store.state();
        let edited = state.items.iter().find(|i| i.id == 3).unwrap();
        assert_eq!(edited.name, "Renamed");
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn delete_removes_locally_even_when_the_server_fails() {
        let api = Arc::new(FakeApi::new(5));
        let store = store_over(api.clone());

        store.fetch(page_params(1)).await.unwrap();
        api.fail_with(FailureMode::Status);

        store.delete(2).await.unwrap_err();

        let state = store.state();
        assert!(state.items.iter().all(|i| i.id != 2));
        assert_eq!(state.total_count, 4);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn source_fetch_reports_items_and_total() {
        let api = Arc::new(FakeApi::new(20));
        let store = store_over(api);

        let hits = CollectionSource::fetch(&store, page_params(1))
            .await
            .unwrap();
        assert_eq!(hits.items.len(), 15);
        assert_eq!(hits.total, 20);
    }
}
