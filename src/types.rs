use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Page size applied when a query does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = 15;

// ── Collections ───────────────────────────────────────────────────────────

/// The three fetchable item types the directory exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Businesses,
    Services,
    Products,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Businesses,
        Collection::Services,
        Collection::Products,
    ];

    /// URL path segment of this collection's endpoints.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Businesses => "businesses",
            Self::Services => "services",
            Self::Products => "products",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

// ── Items ─────────────────────────────────────────────────────────────────

/// One directory record. Collection-specific display fields ride along in
/// `fields`; the sync layer treats them as opaque once cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

// ── Query parameters ──────────────────────────────────────────────────────

/// Caller-facing query parameters. `page`/`limit` are translated to an
/// `offset` before transmission; everything except the page number feeds
/// the page-cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl QueryParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1)
    }

    /// Translate `page`/`limit` into the wire query the API expects.
    pub fn normalize(&self) -> RequestQuery {
        let limit = self.limit();
        RequestQuery {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            category: self.category.clone(),
            ordering: self.ordering.clone(),
            filters: self.filters.clone(),
            limit,
            offset: (self.page() - 1) * limit,
        }
    }

    /// Cache fingerprint of everything except the page number. Two queries
    /// with the same fingerprint share a page map.
    pub fn fingerprint(&self) -> String {
        let query = self.normalize();
        let filters: Vec<String> = query
            .filters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!(
            "s={}|c={}|o={}|l={}|f={}",
            query.search.as_deref().unwrap_or(""),
            query.category.as_deref().unwrap_or(""),
            query.ordering.as_deref().unwrap_or(""),
            query.limit,
            filters.join("&"),
        )
    }

    /// Same query, different page.
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page: Some(page),
            ..self.clone()
        }
    }
}

/// Normalized wire query: `page`/`limit` resolved to `limit`/`offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub ordering: Option<String>,
    pub filters: BTreeMap<String, String>,
    pub limit: u32,
    pub offset: u32,
}

impl RequestQuery {
    /// Query-string pairs in a stable order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category".to_string(), category.clone()));
        }
        if let Some(ordering) = &self.ordering {
            pairs.push(("ordering".to_string(), ordering.clone()));
        }
        for (key, value) in &self.filters {
            pairs.push((key.clone(), value.clone()));
        }
        pairs.push(("limit".to_string(), self.limit.to_string()));
        pairs.push(("offset".to_string(), self.offset.to_string()));
        pairs
    }
}

// ── List responses ────────────────────────────────────────────────────────

/// One decoded page of a collection listing, shape-normalized from either
/// the paginated envelope or the bare-array fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Item>,
    pub total: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

// ── Collection state ──────────────────────────────────────────────────────

/// The only state consumers see. `items` may briefly show cached (stale)
/// data while a refresh is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionState {
    pub items: Vec<Item>,
    pub total_count: u64,
    pub current_page: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            current_page: 1,
            has_next_page: false,
            has_previous_page: false,
            is_loading: false,
            error: None,
        }
    }
}

// ── Search state ──────────────────────────────────────────────────────────

/// One aggregate search result, tagged with its source collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub collection: Collection,
    pub item: Item,
}

/// Aggregate counters persisted alongside history and popularity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub total_searches: u64,
    pub cache_hits: u64,
}

/// Reactive search state published by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub term: String,
    pub filters: BTreeMap<String, String>,
    pub results: Vec<SearchHit>,
    pub total_results: u64,
    pub is_searching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub search_history: Vec<String>,
    pub popular_searches: Vec<String>,
    pub search_stats: SearchStats,
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: u32, limit: u32) -> QueryParams {
        QueryParams {
            page: Some(page),
            limit: Some(limit),
            ..QueryParams::default()
        }
    }

    #[test]
    fn normalize_translates_page_to_offset() {
        assert_eq!(params(1, 15).normalize().offset, 0);
        assert_eq!(params(2, 15).normalize().offset, 15);
        assert_eq!(params(3, 10).normalize().offset, 20);
    }

    #[test]
    fn normalize_defaults_and_clamps() {
        let query = QueryParams::default().normalize();
        assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(query.offset, 0);

        let zero = params(0, 0).normalize();
        assert_eq!(zero.limit, 1);
        assert_eq!(zero.offset, 0);
    }

    #[test]
    fn normalize_drops_blank_search() {
        let blank = QueryParams {
            search: Some("   ".to_string()),
            ..QueryParams::default()
        };
        assert_eq!(blank.normalize().search, None);

        let padded = QueryParams {
            search: Some("  bakery ".to_string()),
            ..QueryParams::default()
        };
        assert_eq!(padded.normalize().search.as_deref(), Some("bakery"));
    }

    #[test]
    fn fingerprint_ignores_page() {
        let a = params(1, 15);
        let b = a.with_page(4);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_search_and_filters() {
        let plain = QueryParams::default();
        let searched = QueryParams {
            search: Some("bus".to_string()),
            ..QueryParams::default()
        };
        assert_ne!(plain.fingerprint(), searched.fingerprint());

        let mut filtered = plain.clone();
        filtered.filters.insert("city".to_string(), "reno".to_string());
        assert_ne!(plain.fingerprint(), filtered.fingerprint());
    }

    #[test]
    fn pairs_include_limit_and_offset() {
        let pairs = params(2, 15).normalize().to_pairs();
        assert!(pairs.contains(&("limit".to_string(), "15".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "15".to_string())));
    }

    #[test]
    fn item_round_trips_extra_fields() {
        let raw = serde_json::json!({
            "id": 7,
            "name": "Cornerstone Bakery",
            "category": "food",
            "rating": 4.5,
        });
        let item: Item = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.name, "Cornerstone Bakery");
        assert_eq!(item.fields["category"], "food");
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }
}
