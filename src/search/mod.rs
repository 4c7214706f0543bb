//! Search orchestration: debounced input, bounded result caching, and
//! persisted history/popularity, fanned out over the collection stores.

pub mod history;
pub mod orchestrator;
pub mod result_cache;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::{Collection, Item, QueryParams};

pub use orchestrator::{SearchConfig, SearchOrchestrator};

/// What one collection contributed to a combined search.
#[derive(Debug, Clone)]
pub struct SourceHits {
    pub items: Vec<Item>,
    pub total: u64,
}

/// A queryable collection the search layer fans out to. Implemented by
/// `sync::store::CollectionStore`; injected so the orchestrator can be
/// driven against fakes.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Which collection this source serves.
    fn collection(&self) -> Collection;

    /// Fetch with the search term merged into the source's params.
    async fn fetch(&self, params: QueryParams) -> Result<SourceHits, SyncError>;

    /// Names of items this source already holds, used for suggestions.
    fn cached_names(&self) -> Vec<String>;
}
