// ---------------------------------------------------------------------------
// Prefetcher
// ---------------------------------------------------------------------------
//
// Best-effort background fetch of the likely-next page. Runs on its own
// cancellation slot so it never competes with the coordinator's single
// authoritative request; a newer prefetch supersedes an older one.
// Failures are logged at debug and dropped — a later explicit navigation
// simply refetches through the normal path.
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::api::DirectoryApi;
use crate::sync::page_cache::PageCache;
use crate::sync::shuffle::shuffle_page;
use crate::types::{Collection, QueryParams};

pub struct Prefetcher {
    slot: Mutex<Option<CancellationToken>>,
    enabled: bool,
}

impl Prefetcher {
    pub fn new(enabled: bool) -> Self {
        Self {
            slot: Mutex::new(None),
            enabled,
        }
    }

    /// Fetch the page named by `params` into `cache` in the background,
    /// without blocking the caller. Replaces any prefetch still in flight.
    pub fn spawn(
        &self,
        api: Arc<dyn DirectoryApi>,
        collection: Collection,
        cache: Arc<Mutex<PageCache>>,
        params: QueryParams,
    ) {
        if !self.enabled {
            return;
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.slot.lock().unwrap().replace(token.clone()) {
            previous.cancel();
        }

        let query = params.normalize();
        let fingerprint = params.fingerprint();
        let page = params.page();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = api.list(collection, &query) => result,
            };
            match result {
                Ok(mut loaded) => {
                    shuffle_page(&mut loaded.items);
                    cache.lock().unwrap().put(&fingerprint, page, loaded.items);
                    tracing::debug!(%collection, page, "Prefetched next page");
                }
                Err(e) => {
                    tracing::debug!(%collection, page, "Prefetch dropped: {}", e);
                }
            }
        });
    }
}
