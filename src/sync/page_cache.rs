// ---------------------------------------------------------------------------
// Page Cache
// ---------------------------------------------------------------------------
//
// Per-store cache of previously fetched result pages, keyed by the query
// fingerprint (everything except the page number) plus the page number.
// Supplies stale pages for instant publication while a refresh is in
// flight. Absence is a normal, expected outcome; there is no expiry policy
// beyond what the owning store imposes.
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Item;

/// One cached page and when it was fetched.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub items: Vec<Item>,
    pub fetched_at: u64,
}

/// Page-indexed store of fetched result pages.
#[derive(Default)]
pub struct PageCache {
    /// fingerprint -> page number -> entry
    pages: HashMap<String, HashMap<u32, PageEntry>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached page. `None` means "not fetched yet".
    pub fn get(&self, fingerprint: &str, page: u32) -> Option<&PageEntry> {
        self.pages.get(fingerprint)?.get(&page)
    }

    /// Store a freshly fetched page, replacing any previous entry for the
    /// same key.
    pub fn put(&mut self, fingerprint: &str, page: u32, items: Vec<Item>) {
        self.pages
            .entry(fingerprint.to_string())
            .or_default()
            .insert(
                page,
                PageEntry {
                    items,
                    fetched_at: now_millis(),
                },
            );
    }

    /// All cached entries across fingerprints, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &PageEntry> {
        self.pages.values().flat_map(|pages| pages.values())
    }

    /// Number of cached pages across all fingerprints.
    pub fn len(&self) -> usize {
        self.pages.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached page. Nothing calls this on mutation; stale pages
    /// survive create/update/delete.
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
