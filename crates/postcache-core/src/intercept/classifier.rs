//! Request classification
//!
//! Decides, from method and URL alone, whether a request is a paginated list
//! fetch the cache may answer, a write that must invalidate cached pages, or
//! anything else. Classification is an allow-list: only paths that match the
//! endpoint templates exactly are ever touched.

use crate::error::{PostcacheError, PostcacheResult};
use regex::Regex;
use reqwest::Method;
use url::Url;

/// Path segments that are never classified, whatever else matches
const EXCLUDED_SEGMENTS: &[&str] = &[
    "session", "sessions", "auth", "login", "logout", "oauth", "me", "profile",
];

/// Shape of the list and write endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    /// Path prefix of the API, without trailing slash
    pub api_prefix: String,
    /// Collection holding the resources (`cases`)
    pub collection: String,
    /// Paginated list under a resource (`posts`)
    pub list_resource: String,
    /// Sub-resources whose writes change the list
    pub write_resources: Vec<String>,
    /// Query parameter carrying the page size
    pub page_size_param: String,
    /// Query parameter carrying the cursor
    pub cursor_param: String,
}

impl Default for EndpointTemplate {
    fn default() -> Self {
        Self {
            api_prefix: "/api/v1".to_string(),
            collection: "cases".to_string(),
            list_resource: "posts".to_string(),
            write_resources: vec!["posts".to_string(), "notes".to_string(), "reply".to_string()],
            page_size_param: "limit".to_string(),
            cursor_param: "after_id".to_string(),
        }
    }
}

/// What a request is, as far as the cache is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A paginated list read for a resource
    ListFetch { resource_id: String },
    /// A write that changes a resource's list
    Write { resource_id: String },
    /// Anything else
    Other,
}

/// Pure request classifier built from an [`EndpointTemplate`]
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    template: EndpointTemplate,
    list_pattern: Regex,
    write_pattern: Regex,
}

impl RequestClassifier {
    pub fn new(template: EndpointTemplate) -> PostcacheResult<Self> {
        let base = format!(
            "^{}/{}/(\\d+)/",
            regex::escape(template.api_prefix.trim_end_matches('/')),
            regex::escape(&template.collection)
        );
        let list_pattern = format!("{}{}/?$", base, regex::escape(&template.list_resource));
        let writes = template
            .write_resources
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        let write_pattern = format!("{}(?:{})(?:/[^/]+)?/?$", base, writes);

        Ok(Self {
            list_pattern: Regex::new(&list_pattern)
                .map_err(|e| PostcacheError::config(format!("Invalid list template: {}", e)))?,
            write_pattern: Regex::new(&write_pattern)
                .map_err(|e| PostcacheError::config(format!("Invalid write template: {}", e)))?,
            template,
        })
    }

    pub fn template(&self) -> &EndpointTemplate {
        &self.template
    }

    /// Classify a request
    pub fn classify(&self, method: &Method, url: &Url) -> Classification {
        let path = url.path();
        if is_excluded(path) {
            return Classification::Other;
        }

        if *method == Method::GET {
            if let Some(resource_id) = capture_id(&self.list_pattern, path) {
                if self.has_pagination_params(url) {
                    return Classification::ListFetch { resource_id };
                }
            }
            return Classification::Other;
        }

        let is_write = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method);
        if is_write {
            if let Some(resource_id) = capture_id(&self.write_pattern, path) {
                return Classification::Write { resource_id };
            }
        }
        Classification::Other
    }

    /// True only for GETs of the list endpoint that carry a pagination parameter
    pub fn is_paginated_list_fetch(&self, method: &Method, url: &Url) -> bool {
        matches!(self.classify(method, url), Classification::ListFetch { .. })
    }

    fn has_pagination_params(&self, url: &Url) -> bool {
        url.query_pairs().any(|(name, _)| {
            name == self.template.page_size_param.as_str()
                || name == self.template.cursor_param.as_str()
        })
    }
}

fn capture_id(pattern: &Regex, path: &str) -> Option<String> {
    pattern
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_excluded(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    segments.iter().any(|s| EXCLUDED_SEGMENTS.contains(s))
        || segments.windows(2).any(|w| w[0] == "users" && w[1] == "me")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RequestClassifier {
        RequestClassifier::new(EndpointTemplate::default()).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(&format!("https://help.example.com{}", s)).unwrap()
    }

    #[test]
    fn test_list_fetch_is_recognized() {
        let c = classifier();
        for path in [
            "/api/v1/cases/42/posts?limit=30",
            "/api/v1/cases/42/posts/?after_id=100",
            "/api/v1/cases/42/posts?include=*&limit=30&after_id=9",
        ] {
            assert_eq!(
                c.classify(&Method::GET, &url(path)),
                Classification::ListFetch {
                    resource_id: "42".into()
                },
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_list_without_pagination_params_is_other() {
        let c = classifier();
        assert!(!c.is_paginated_list_fetch(&Method::GET, &url("/api/v1/cases/42/posts")));
        assert!(!c.is_paginated_list_fetch(
            &Method::GET,
            &url("/api/v1/cases/42/posts?include=*")
        ));
    }

    #[test]
    fn test_near_misses_are_other() {
        let c = classifier();
        for path in [
            "/api/v1/cases/42/posts/7?limit=30",
            "/api/v1/cases/abc/posts?limit=30",
            "/api/v1/cases/42/postsx?limit=30",
            "/api/v2/cases/42/posts?limit=30",
            "/other/api/v1/cases/42/posts?limit=30",
            "/api/v1/users/42/posts?limit=30",
            "/api/v1/cases/42/notes?limit=30",
        ] {
            assert_eq!(c.classify(&Method::GET, &url(path)), Classification::Other, "{}", path);
        }
    }

    #[test]
    fn test_non_get_list_is_not_a_fetch() {
        let c = classifier();
        assert!(!c.is_paginated_list_fetch(
            &Method::HEAD,
            &url("/api/v1/cases/42/posts?limit=30")
        ));
    }

    #[test]
    fn test_exclusion_list_wins() {
        let c = classifier();
        for path in [
            "/api/v1/session?limit=30",
            "/api/v1/users/me?limit=30",
            "/api/v1/cases/42/posts/me?limit=10",
            "/api/v1/OAuth/cases/42/posts?limit=30",
        ] {
            assert_eq!(c.classify(&Method::GET, &url(path)), Classification::Other, "{}", path);
        }
    }

    #[test]
    fn test_writes() {
        let c = classifier();
        let write = |m: Method, p: &str| c.classify(&m, &url(p));
        let expected = Classification::Write {
            resource_id: "42".into(),
        };

        assert_eq!(write(Method::POST, "/api/v1/cases/42/posts"), expected);
        assert_eq!(write(Method::POST, "/api/v1/cases/42/reply"), expected);
        assert_eq!(write(Method::PUT, "/api/v1/cases/42/notes/9"), expected);
        assert_eq!(write(Method::DELETE, "/api/v1/cases/42/posts/9/"), expected);
        assert_eq!(write(Method::PATCH, "/api/v1/cases/42/posts/9"), expected);
        assert_eq!(
            write(Method::POST, "/api/v1/cases/42/attachments"),
            Classification::Other
        );
        assert_eq!(write(Method::POST, "/api/v1/session"), Classification::Other);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let c = classifier();
        let inputs = [
            (Method::GET, "/api/v1/cases/1/posts?limit=5"),
            (Method::POST, "/api/v1/cases/1/notes"),
            (Method::GET, "/api/v1/login"),
        ];
        for (method, path) in inputs {
            let u = url(path);
            let first = c.classify(&method, &u);
            for _ in 0..5 {
                assert_eq!(c.classify(&method, &u), first);
            }
        }
    }

    #[test]
    fn test_custom_template() {
        let c = RequestClassifier::new(EndpointTemplate {
            api_prefix: "/v2/".into(),
            collection: "tickets".into(),
            list_resource: "messages".into(),
            write_resources: vec!["messages".into()],
            page_size_param: "per_page".into(),
            cursor_param: "cursor".into(),
        })
        .unwrap();
        assert!(c.is_paginated_list_fetch(&Method::GET, &url("/v2/tickets/5/messages?per_page=10")));
        assert!(!c.is_paginated_list_fetch(&Method::GET, &url("/v2/tickets/5/messages?limit=10")));
    }
}
