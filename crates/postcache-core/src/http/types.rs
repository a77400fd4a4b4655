//! Request and response types

use crate::error::PostcacheResult;
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// An outgoing HTTP request as seen by the interceptor
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Same request aimed at a different URL
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            ..self.clone()
        }
    }
}

/// Read-only view of a completed response.
///
/// Implemented by real network responses and by responses synthesized from
/// the cache; consumers only ever see this trait.
pub trait ResponseView: Send + Sync + std::fmt::Debug {
    /// Numeric HTTP status
    fn status(&self) -> u16;

    fn status_text(&self) -> &str;

    /// URL the response belongs to
    fn url(&self) -> &str;

    /// Raw body text
    fn text(&self) -> &str;

    /// Body parsed as JSON
    fn json(&self) -> PostcacheResult<Value> {
        Ok(serde_json::from_str(self.text())?)
    }

    /// Header value by case-insensitive name
    fn header(&self, name: &str) -> Option<&str>;

    /// All headers as `name: value` lines separated by CRLF
    fn all_headers(&self) -> String;

    /// Whether the response was produced from the cache
    fn from_cache(&self) -> bool;

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status())
    }
}

/// Case-insensitive header lookup over a name/value list
pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub(crate) fn render_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{}: {}\r\n", k, v))
        .collect()
}

/// A response received from the network
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Wall-clock latency of the request in milliseconds
    pub elapsed_ms: u64,
}

impl NetworkResponse {
    /// A JSON response with the usual content type, mostly useful for fakes
    pub fn json_ok(url: impl Into<String>, body: &Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            url: url.into(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
            elapsed_ms: 0,
        }
    }

    /// A response with the given status and body text
    pub fn with_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
                .to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
            elapsed_ms: 0,
        }
    }
}

impl ResponseView for NetworkResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn status_text(&self) -> &str {
        &self.status_text
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn text(&self) -> &str {
        &self.body
    }

    fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    fn all_headers(&self) -> String {
        render_headers(&self.headers)
    }

    fn from_cache(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = NetworkResponse::json_ok("https://x.test/a", &json!({}));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header("etag"), None);
        assert_eq!(response.all_headers(), "content-type: application/json\r\n");
    }

    #[test]
    fn test_status_helpers() {
        let ok = NetworkResponse::with_status("u", 204, "");
        assert!(ok.is_success());
        assert_eq!(ok.status_text(), "No Content");

        let missing = NetworkResponse::with_status("u", 404, "nope");
        assert!(!missing.is_success());
        assert!(missing.json().is_err());
    }

    #[test]
    fn test_request_builders() {
        let url = Url::parse("https://x.test/api/v1/cases/1/posts").unwrap();
        let request = HttpRequest::get(url.clone())
            .with_header("accept", "application/json")
            .with_body("{}");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.headers.len(), 1);

        let moved = request.with_url(Url::parse("https://y.test/").unwrap());
        assert_eq!(moved.body.as_deref(), Some("{}"));
        assert_ne!(moved.url, url);
    }
}
