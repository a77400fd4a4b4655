//! Responses fabricated from cache entries

use super::types::{ResponseView, find_header, render_headers};
use crate::cache::CacheEntry;
use crate::error::{PostcacheError, PostcacheResult};
use serde_json::Value;

/// Status text of every synthesized response
pub const CACHED_STATUS_TEXT: &str = "OK (cached)";

/// Header marking a response as served from the cache
pub const CACHE_MARKER_HEADER: &str = "x-postcache";

/// A complete, self-consistent response built from a cache entry.
///
/// Every field is fixed at construction; the body text and the parsed value
/// always describe the same JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedResponse {
    key: String,
    url: String,
    body: String,
    value: Value,
    headers: Vec<(String, String)>,
    stored_at: u64,
}

impl SynthesizedResponse {
    /// Build the response for an entry.
    ///
    /// The payload is serialized exactly once. A payload that is itself a JSON
    /// string is refused: it would be a body that was already serialized, and
    /// the consumer would receive a quoted string instead of the object.
    pub fn from_entry(entry: &CacheEntry) -> PostcacheResult<Self> {
        if entry.payload.is_string() {
            return Err(PostcacheError::synthesis(
                &entry.key,
                "payload is a JSON string, not a decoded body",
            ));
        }

        let body = serde_json::to_string(&entry.payload)
            .map_err(|e| PostcacheError::synthesis(&entry.key, e.to_string()))?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| PostcacheError::synthesis(&entry.key, e.to_string()))?;
        if value != entry.payload {
            return Err(PostcacheError::synthesis(
                &entry.key,
                "serialized body does not reproduce the payload",
            ));
        }

        Ok(Self {
            key: entry.key.clone(),
            url: entry.source_url.clone(),
            body,
            value,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("cache-control".to_string(), "no-cache".to_string()),
                (CACHE_MARKER_HEADER.to_string(), "HIT".to_string()),
            ],
            stored_at: entry.stored_at,
        })
    }

    /// Rendered cache key of the source entry
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stored_at(&self) -> u64 {
        self.stored_at
    }

    /// The decoded body
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl ResponseView for SynthesizedResponse {
    fn status(&self) -> u16 {
        200
    }

    fn status_text(&self) -> &str {
        CACHED_STATUS_TEXT
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn text(&self) -> &str {
        &self.body
    }

    fn json(&self) -> PostcacheResult<Value> {
        Ok(self.value.clone())
    }

    fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    fn all_headers(&self) -> String {
        render_headers(&self.headers)
    }

    fn from_cache(&self) -> bool {
        true
    }
}
