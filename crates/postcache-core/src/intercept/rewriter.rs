//! URL rewriting for enlarged page sizes

use crate::error::{PostcacheError, PostcacheResult};
use url::Url;

/// Enlarges the page size of list URLs.
///
/// The raw query string is edited segment by segment, so every other
/// parameter keeps its position and its exact encoding.
#[derive(Debug, Clone)]
pub struct UrlRewriter {
    page_size_param: String,
    threshold: u32,
}

impl UrlRewriter {
    /// `threshold`: requested page sizes at or below it may be replaced
    pub fn new(page_size_param: impl Into<String>, threshold: u32) -> Self {
        Self {
            page_size_param: page_size_param.into(),
            threshold,
        }
    }

    /// Rewrite `url` to ask for `page_size` items.
    ///
    /// A missing page-size parameter is appended. One at or below the
    /// threshold is replaced, but only when that enlarges the page; a request
    /// never gets fewer items than it asked for. A non-numeric value is an
    /// error; callers then keep the original URL.
    pub fn rewrite(&self, url: &Url, page_size: u32) -> PostcacheResult<Url> {
        let raw_query = url.query().unwrap_or("");
        let mut segments: Vec<String> = raw_query
            .split('&')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let position = segments
            .iter()
            .position(|s| s.split('=').next() == Some(self.page_size_param.as_str()));

        match position {
            Some(index) => {
                let value = segments[index]
                    .split_once('=')
                    .map(|(_, v)| v)
                    .unwrap_or("");
                let requested: u32 = value.parse().map_err(|_| {
                    PostcacheError::url_parse(
                        url.as_str(),
                        format!(
                            "{} value '{}' is not a number",
                            self.page_size_param, value
                        ),
                    )
                })?;
                if requested > self.threshold || requested >= page_size {
                    return Ok(url.clone());
                }
                segments[index] = format!("{}={}", self.page_size_param, page_size);
            }
            None => segments.push(format!("{}={}", self.page_size_param, page_size)),
        }

        let mut rewritten = url.clone();
        rewritten.set_query(Some(&segments.join("&")));
        Ok(rewritten)
    }
}

/// Parse a request URL, resolving relative ones against `base`
pub fn parse_request_url(base: Option<&Url>, raw: &str) -> PostcacheResult<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(raw)
                .map_err(|e| PostcacheError::url_parse(raw, e.to_string())),
            None => Err(PostcacheError::url_parse(
                raw,
                "relative URL without a base origin",
            )),
        },
        Err(e) => Err(PostcacheError::url_parse(raw, e.to_string())),
    }
}
