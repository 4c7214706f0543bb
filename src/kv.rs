//! Durable key-value persistence for search history and analytics.
//!
//! The search orchestrator only ever sees the narrow [`KvStore`] trait;
//! whether values land in a JSON file or stay in memory is wiring.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Narrow persistence abstraction: string keys, string values.
/// Writes are best-effort; implementations absorb their own failures.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

// ── In-memory store ───────────────────────────────────────────────────────

/// Non-durable store used in tests and when no storage path is available.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

// ── JSON file store ───────────────────────────────────────────────────────

/// Write-through store holding all keys in a single JSON object file.
/// The file is loaded once on open and rewritten on every `set`; IO
/// failures are logged and swallowed so persistence problems never reach
/// foreground search state.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Discarding unreadable search store: {}", e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %self.path.display(), "Failed to create storage directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(entries) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    tracing::warn!(path = %self.path.display(), "Failed to persist search store: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize search store: {}", e),
        }
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
