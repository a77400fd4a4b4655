//! From trait implementations for PostcacheError conversions

use super::types::PostcacheError;

impl From<anyhow::Error> for PostcacheError {
    fn from(error: anyhow::Error) -> Self {
        Self::other(error.to_string())
    }
}

impl From<std::io::Error> for PostcacheError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for PostcacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<reqwest::Error> for PostcacheError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout {
                millis: 0,
                context: error.url().map(|u| u.to_string()),
            };
        }
        let status_code = error.status().map(|s| s.as_u16());
        let url = error.url().map(|u| u.to_string());
        Self::Http {
            message: error.to_string(),
            url,
            status_code,
            context: None,
        }
    }
}

impl From<url::ParseError> for PostcacheError {
    fn from(error: url::ParseError) -> Self {
        Self::UrlParse {
            url: String::new(),
            message: error.to_string(),
            context: None,
        }
    }
}

impl From<tokio::time::error::Elapsed> for PostcacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout(0)
    }
}
