use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::protocol::*;
use crate::search::SearchOrchestrator;
use crate::sync::store::CollectionStore;
use crate::transport::NdjsonTransport;
use crate::types::Collection;

// ── Server configuration ──────────────────────────────────────────────────

pub struct ServerConfig {
    pub server_name: String,
    pub server_version: String,
}

// ── Sync server ───────────────────────────────────────────────────────────

pub struct SyncServer {
    config: ServerConfig,
    transport: NdjsonTransport,
    stores: HashMap<Collection, Arc<CollectionStore>>,
    search: Arc<SearchOrchestrator>,
}

impl SyncServer {
    pub fn new(
        config: ServerConfig,
        transport: NdjsonTransport,
        stores: HashMap<Collection, Arc<CollectionStore>>,
        search: Arc<SearchOrchestrator>,
    ) -> Self {
        Self {
            config,
            transport,
            stores,
            search,
        }
    }

    /// Main loop: read JSON-RPC messages from stdin, dispatch to handlers.
    /// Fetch and mutation handlers are spawned so a newer request can
    /// supersede one still in flight.
    pub async fn run(&self) -> Result<()> {
        self.spawn_state_forwarders();

        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let msg: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Parse error: {}", e);
                    self.transport
                        .write_error(0, PARSE_ERROR, "Parse error: invalid JSON");
                    continue;
                }
            };

            self.dispatch(msg);
        }

        Ok(())
    }

    /// Forward watch-state changes to the client as notifications.
    fn spawn_state_forwarders(&self) {
        for (&collection, store) in &self.stores {
            let mut rx = store.subscribe();
            let transport = self.transport.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = rx.borrow_and_update().clone();
                    let update = CollectionStateUpdate { collection, state };
                    if let Ok(params) = serde_json::to_value(&update) {
                        transport.write_notification("collection/state", params);
                    }
                }
            });
        }

        let mut rx = self.search.subscribe();
        let transport = self.transport.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if let Ok(params) = serde_json::to_value(&state) {
                    transport.write_notification("search/state", params);
                }
            }
        });
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    fn dispatch(&self, msg: JsonRpcRequest) {
        let id = msg.id.unwrap_or(0);
        let method = match msg.method {
            Some(m) => m,
            None => {
                // Response to something we sent — ignore.
                return;
            }
        };

        match method.as_str() {
            "initialize" => self.handle_initialize(id),

            "collection/fetch" => self.handle_fetch(id, msg.params),
            "collection/create" => self.handle_create(id, msg.params),
            "collection/update" => self.handle_update(id, msg.params),
            "collection/delete" => self.handle_delete(id, msg.params),
            "collection/state" => self.handle_collection_state(id, msg.params),

            "search/setTerm" => self.handle_set_term(id, msg.params),
            "search/setFilters" => self.handle_set_filters(id, msg.params),
            "search/execute" => self.handle_execute_search(id, msg.params),
            "search/clear" => self.handle_clear_search(id),
            "search/clearFilters" => self.handle_clear_filters(id),
            "search/suggestions" => self.handle_suggestions(id, msg.params),
            "search/state" => self.handle_search_state(id),

            _ => {
                self.transport.write_error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                );
            }
        }
    }

    fn parse_params<T: DeserializeOwned>(
        &self,
        id: u64,
        params: Option<serde_json::Value>,
    ) -> Option<T> {
        let value = params.unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.transport
                    .write_error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
                None
            }
        }
    }

    fn store(&self, collection: Collection) -> Arc<CollectionStore> {
        // One store per collection is created at startup.
        Arc::clone(&self.stores[&collection])
    }

    // ── Handlers ──────────────────────────────────────────────────────────

    fn handle_initialize(&self, id: u64) {
        let result = InitializeResult {
            server_info: ServerInfo {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
            collections: Collection::ALL.to_vec(),
        };
        match serde_json::to_value(result) {
            Ok(value) => self.transport.write_response(id, value),
            Err(e) => self
                .transport
                .write_error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn handle_fetch(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<FetchParams>(id, params) else {
            return;
        };
        let store = self.store(parsed.collection);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match store.fetch(parsed.query).await {
                Ok(state) => match serde_json::to_value(state) {
                    Ok(value) => transport.write_response(id, value),
                    Err(e) => transport.write_error(id, INTERNAL_ERROR, e.to_string()),
                },
                Err(e) => transport.write_sync_error(id, &e),
            }
        });
    }

    fn handle_create(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<CreateParams>(id, params) else {
            return;
        };
        let store = self.store(parsed.collection);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match store.create(parsed.data).await {
                Ok(item) => match serde_json::to_value(item) {
                    Ok(value) => transport.write_response(id, value),
                    Err(e) => transport.write_error(id, INTERNAL_ERROR, e.to_string()),
                },
                Err(e) => transport.write_sync_error(id, &e),
            }
        });
    }

    fn handle_update(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<UpdateParams>(id, params) else {
            return;
        };
        let store = self.store(parsed.collection);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match store.update(parsed.id, parsed.data).await {
                Ok(item) => match serde_json::to_value(item) {
                    Ok(value) => transport.write_response(id, value),
                    Err(e) => transport.write_error(id, INTERNAL_ERROR, e.to_string()),
                },
                Err(e) => transport.write_sync_error(id, &e),
            }
        });
    }

    fn handle_delete(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<DeleteParams>(id, params) else {
            return;
        };
        let store = self.store(parsed.collection);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match store.delete(parsed.id).await {
                Ok(()) => transport.write_response(id, serde_json::json!({})),
                Err(e) => transport.write_sync_error(id, &e),
            }
        });
    }

    fn handle_collection_state(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<StateParams>(id, params) else {
            return;
        };
        let state = self.store(parsed.collection).state();
        match serde_json::to_value(state) {
            Ok(value) => self.transport.write_response(id, value),
            Err(e) => self
                .transport
                .write_error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn handle_set_term(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<SetTermParams>(id, params) else {
            return;
        };
        self.search.set_search_term(parsed.term);
        // Results arrive later via the search/state notification.
        self.transport.write_response(id, serde_json::json!({}));
    }

    fn handle_set_filters(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<SetFiltersParams>(id, params) else {
            return;
        };
        self.search.set_filters(parsed.filters);
        self.transport.write_response(id, serde_json::json!({}));
    }

    fn handle_execute_search(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<ExecuteSearchParams>(id, params) else {
            return;
        };
        let search = Arc::clone(&self.search);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let state = search.execute_search(&parsed.term, parsed.filters).await;
            match serde_json::to_value(state) {
                Ok(value) => transport.write_response(id, value),
                Err(e) => transport.write_error(id, INTERNAL_ERROR, e.to_string()),
            }
        });
    }

    fn handle_clear_search(&self, id: u64) {
        self.search.clear_search();
        self.transport.write_response(id, serde_json::json!({}));
    }

    fn handle_clear_filters(&self, id: u64) {
        self.search.clear_filters();
        self.transport.write_response(id, serde_json::json!({}));
    }

    fn handle_suggestions(&self, id: u64, params: Option<serde_json::Value>) {
        let Some(parsed) = self.parse_params::<SuggestionsParams>(id, params) else {
            return;
        };
        let suggestions = self.search.suggestions(&parsed.prefix);
        self.transport
            .write_response(id, serde_json::json!({ "suggestions": suggestions }));
    }

    fn handle_search_state(&self, id: u64) {
        match serde_json::to_value(self.search.state()) {
            Ok(value) => self.transport.write_response(id, value),
            Err(e) => self
                .transport
                .write_error(id, INTERNAL_ERROR, e.to_string()),
        }
    }
}
