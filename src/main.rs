use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use plaza_sync_engine::api::{ApiConfig, DirectoryApi, HttpDirectoryApi};
use plaza_sync_engine::config::CliArgs;
use plaza_sync_engine::kv::{JsonFileStore, KvStore, MemoryStore};
use plaza_sync_engine::search::{CollectionSource, SearchConfig, SearchOrchestrator};
use plaza_sync_engine::server::{ServerConfig, SyncServer};
use plaza_sync_engine::sync::store::{CollectionStore, StoreConfig};
use plaza_sync_engine::transport::NdjsonTransport;
use plaza_sync_engine::types::Collection;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Logging goes to stderr — stdout carries the NDJSON protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let api: Arc<dyn DirectoryApi> = Arc::new(HttpDirectoryApi::new(ApiConfig {
        base_url: args.api_url.clone(),
        timeout_secs: args.request_timeout,
    })?);

    let store_config = StoreConfig {
        default_limit: args.page_limit,
        prefetch: !args.no_prefetch,
    };
    let mut stores: HashMap<Collection, Arc<CollectionStore>> = HashMap::new();
    for collection in Collection::ALL {
        stores.insert(
            collection,
            Arc::new(CollectionStore::new(
                collection,
                api.clone(),
                store_config.clone(),
            )),
        );
    }

    let storage_path = args
        .storage_path
        .clone()
        .or_else(|| dirs::data_dir().map(|d| d.join("plaza").join("search-store.json")));
    let kv: Arc<dyn KvStore> = match storage_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using search store");
            Arc::new(JsonFileStore::open(path))
        }
        None => {
            tracing::warn!("No data directory available; search history will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let sources: Vec<Arc<dyn CollectionSource>> = Collection::ALL
        .iter()
        .map(|collection| Arc::clone(&stores[collection]) as Arc<dyn CollectionSource>)
        .collect();
    let search = SearchOrchestrator::new(
        sources,
        kv,
        SearchConfig {
            debounce: Duration::from_millis(args.debounce_ms),
            source_limit: args.search_limit,
            ..SearchConfig::default()
        },
    );

    let server = SyncServer::new(
        ServerConfig {
            server_name: args.server_name,
            server_version: args.server_version,
        },
        NdjsonTransport::new(),
        stores,
        search,
    );

    tracing::info!(api = %args.api_url, "plaza-sync-engine ready");
    server.run().await
}
