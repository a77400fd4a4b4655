//! Cache types and data structures

use super::perf::PerfTotals;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

/// Prefix of every cache record in the persistent tier
pub const PERSISTENT_PREFIX: &str = "postcache_";

/// Cursor value used for the first page of a list
pub const INITIAL_CURSOR: &str = "initial";

/// Milliseconds since the Unix epoch
pub fn current_time_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Identifies one page of one resource's list.
///
/// Rendered as `<resource>_<cursor>_<pageSize>`, where the cursor is the
/// `after_id` value or `initial` for the first page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub resource_id: String,
    pub cursor: Option<String>,
    pub page_size: u32,
}

impl CacheKey {
    pub fn new(resource_id: impl Into<String>, cursor: Option<&str>, page_size: u32) -> Self {
        Self {
            resource_id: resource_id.into(),
            cursor: cursor.filter(|c| !c.is_empty()).map(String::from),
            page_size,
        }
    }

    /// Derive the key from a (rewritten) list URL.
    ///
    /// Query parameters are read by name, so their order does not matter.
    /// Returns `None` when the page-size parameter is missing or not numeric.
    pub fn from_url(
        resource_id: &str,
        url: &Url,
        page_size_param: &str,
        cursor_param: &str,
    ) -> Option<Self> {
        let mut page_size = None;
        let mut cursor = None;
        for (name, value) in url.query_pairs() {
            if name == page_size_param && page_size.is_none() {
                page_size = Some(value.parse::<u32>().ok()?);
            } else if name == cursor_param && cursor.is_none() {
                cursor = Some(value.into_owned());
            }
        }
        Some(Self::new(resource_id, cursor.as_deref(), page_size?))
    }

    /// Recover a key from its rendered form
    pub fn parse(rendered: &str) -> Option<Self> {
        let (resource_id, rest) = rendered.split_once('_')?;
        let (cursor, page_size) = rest.rsplit_once('_')?;
        if resource_id.is_empty() || cursor.is_empty() {
            return None;
        }
        let page_size = page_size.parse().ok()?;
        let cursor = (cursor != INITIAL_CURSOR).then_some(cursor);
        Some(Self::new(resource_id, cursor, page_size))
    }

    /// Whether this is the first page of its list
    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none()
    }

    /// Key under which the entry is stored in the persistent tier
    pub fn persistent_key(&self) -> String {
        format!("{}{}", PERSISTENT_PREFIX, self)
    }

    /// Parse a persistent-tier key; foreign keys yield `None`
    pub fn from_persistent_key(key: &str) -> Option<Self> {
        key.strip_prefix(PERSISTENT_PREFIX).and_then(Self::parse)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.resource_id,
            self.cursor.as_deref().unwrap_or(INITIAL_CURSOR),
            self.page_size
        )
    }
}

/// A cached list page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Rendered cache key
    pub key: String,
    /// Decoded response body, exactly as received
    pub payload: Value,
    /// Write time in milliseconds since the epoch
    pub stored_at: u64,
    /// URL that produced the payload
    pub source_url: String,
    /// Latency of the network call that produced the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_ms: Option<u64>,
}

impl CacheEntry {
    pub fn new(
        key: &CacheKey,
        payload: Value,
        stored_at: u64,
        source_url: impl Into<String>,
        fetch_ms: Option<u64>,
    ) -> Self {
        Self {
            key: key.to_string(),
            payload,
            stored_at,
            source_url: source_url.into(),
            fetch_ms,
        }
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    /// An entry is valid while strictly younger than the TTL
    pub fn is_valid_at(&self, now: u64, ttl_ms: u64) -> bool {
        self.age_ms(now) < ttl_ms
    }

    /// Number of list items in the payload
    pub fn item_count(&self) -> usize {
        list_items(&self.payload).map_or(0, Vec::len)
    }
}

/// The item array of a list payload (`{"data": [...]}` or a bare array)
pub fn list_items(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| payload.as_array())
}

/// Where a `put` ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Written to both tiers
    Persisted,
    /// The persistent tier refused the write; only the memory copy exists
    MemoryOnly,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub memory_entries: usize,
    pub persistent_entries: usize,
    pub persistent_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub quota_failures: u64,
    /// Network time avoided by cache hits, in milliseconds
    pub saved_ms_total: u64,
    pub oldest_stored_at: Option<u64>,
    pub newest_stored_at: Option<u64>,
    /// Totals across every session, when a [`PerfLog`](super::PerfLog) is attached
    pub lifetime: Option<PerfTotals>,
}

impl CacheStatistics {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total_requests = self.hits + self.misses;
        if total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / total_requests as f64
        }
    }

    pub fn formatted_size(&self) -> String {
        format_bytes(self.persistent_bytes)
    }

    /// Share of the size budget in use, in percent
    pub fn usage_percent(&self) -> f64 {
        if self.max_bytes == 0 {
            0.0
        } else {
            self.persistent_bytes as f64 * 100.0 / self.max_bytes as f64
        }
    }
}

/// Human-readable byte size with up to two decimals ("1.5 KB", "0 Bytes")
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_rendering() {
        assert_eq!(CacheKey::new("42", None, 100).to_string(), "42_initial_100");
        assert_eq!(
            CacheKey::new("42", Some("9001"), 100).to_string(),
            "42_9001_100"
        );
        assert_eq!(
            CacheKey::new("42", None, 100).persistent_key(),
            "postcache_42_initial_100"
        );
    }

    #[test]
    fn test_key_from_url_ignores_parameter_order() {
        let a = Url::parse("https://x.test/api/v1/cases/7/posts?limit=100&after_id=55&include=*")
            .unwrap();
        let b = Url::parse("https://x.test/api/v1/cases/7/posts?include=*&after_id=55&limit=100")
            .unwrap();
        let key_a = CacheKey::from_url("7", &a, "limit", "after_id").unwrap();
        let key_b = CacheKey::from_url("7", &b, "limit", "after_id").unwrap();
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.to_string(), "7_55_100");
    }

    #[test]
    fn test_key_from_url_requires_numeric_page_size() {
        let url = Url::parse("https://x.test/api/v1/cases/7/posts?limit=abc").unwrap();
        assert!(CacheKey::from_url("7", &url, "limit", "after_id").is_none());
    }

    #[test]
    fn test_key_parse() {
        let key = CacheKey::parse("42_initial_100").unwrap();
        assert_eq!(key, CacheKey::new("42", None, 100));
        assert!(key.is_first_page());

        let key = CacheKey::parse("42_a_b_100").unwrap();
        assert_eq!(key.cursor.as_deref(), Some("a_b"));

        assert!(CacheKey::parse("42_100").is_none());
        assert!(CacheKey::parse("garbage").is_none());
        assert!(CacheKey::from_persistent_key("other_42_initial_100").is_none());
        assert_eq!(
            CacheKey::from_persistent_key("postcache_42_initial_100"),
            Some(CacheKey::new("42", None, 100))
        );
    }

    #[test]
    fn test_entry_validity_boundary() {
        let entry = CacheEntry::new(&CacheKey::new("1", None, 100), json!({}), 1_000, "u", None);
        assert!(entry.is_valid_at(1_000 + 499, 500));
        assert!(!entry.is_valid_at(1_000 + 500, 500));
        assert!(entry.is_valid_at(0, 500));
    }

    #[test]
    fn test_entry_serialized_field_names() {
        let entry = CacheEntry::new(
            &CacheKey::new("1", None, 100),
            json!({"data": [1, 2]}),
            5,
            "https://x.test/",
            Some(120),
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["storedAt"], json!(5));
        assert_eq!(value["sourceUrl"], json!("https://x.test/"));
        assert_eq!(value["fetchMs"], json!(120));
        assert_eq!(entry.item_count(), 2);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50 MB");
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStatistics {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStatistics::default().hit_rate(), 0.0);
    }
}
