use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "plaza-sync-engine",
    about = "Plaza directory data sync and search engine over JSON-RPC 2.0 / NDJSON stdio"
)]
pub struct CliArgs {
    /// Base URL of the remote directory API
    #[arg(long, default_value = "http://localhost:8000/api", env = "PLAZA_SYNC_API_URL")]
    pub api_url: String,

    /// Page size applied when a fetch does not specify one
    #[arg(long, default_value = "15", env = "PLAZA_SYNC_PAGE_LIMIT")]
    pub page_limit: u32,

    /// Per-collection page size for combined searches
    #[arg(long, default_value = "20", env = "PLAZA_SYNC_SEARCH_LIMIT")]
    pub search_limit: u32,

    /// Debounce window for live search input, in milliseconds
    #[arg(long, default_value = "300", env = "PLAZA_SYNC_DEBOUNCE_MS")]
    pub debounce_ms: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30", env = "PLAZA_SYNC_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// Path of the JSON file holding search history and analytics.
    /// Defaults to <data_dir>/plaza/search-store.json.
    #[arg(long, env = "PLAZA_SYNC_STORAGE")]
    pub storage_path: Option<std::path::PathBuf>,

    /// Disable background prefetching of the next page
    #[arg(long)]
    pub no_prefetch: bool,

    /// Server name in the initialize response
    #[arg(long, default_value = "plaza-sync-engine")]
    pub server_name: String,

    /// Server version
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PLAZA_SYNC_LOG_LEVEL")]
    pub log_level: String,
}
