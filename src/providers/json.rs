//! Generic JSON provider
//!
//! Talks to any endpoint that answers `GET ?q=&count=&recency=` with a JSON
//! array of `{title, url, snippet, publishedAt?}` records.

use super::traits::*;
use crate::error::{Result, SearchError};
use crate::network::{HttpRequest, HttpResponse};
use crate::results::SourceRecord;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default, alias = "published_at")]
    published_at: Option<String>,
}

/// Provider for the plain JSON array contract
pub struct JsonApi {
    name: String,
    base_url: String,
    api_key: Option<String>,
}

impl JsonApi {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

impl ProviderAdapter for JsonApi {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, params: &ProviderParams) -> Result<HttpRequest> {
        if self.base_url.is_empty() {
            return Err(SearchError::Config(format!("{}: base_url is empty", self.name)));
        }
        let mut request = HttpRequest::get(&self.base_url)
            .param("q", &params.query)
            .param("count", params.count.to_string())
            .bearer(self.api_key.as_deref());

        if let Some(recency) = params.recency {
            request = request.param("recency", recency.as_str());
        }

        Ok(request)
    }

    fn response(&self, response: HttpResponse) -> Result<Vec<SourceRecord>> {
        response.error_for_status(&self.name)?;

        let wire: Vec<WireRecord> = response.json()?;
        Ok(wire
            .iter()
            .filter_map(|r| {
                build_record(
                    &self.name,
                    &r.title,
                    &r.url,
                    &r.snippet,
                    r.published_at.as_deref(),
                )
            })
            .collect())
    }
}
