//! SearXNG metasearch provider (free fallback)

use super::traits::*;
use crate::error::Result;
use crate::network::{HttpRequest, HttpResponse};
use crate::results::SourceRecord;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SearxResponse {
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearxResult {
    title: String,
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

/// SearXNG instance queried through its JSON output format
pub struct Searxng {
    name: String,
    base_url: String,
}

impl Searxng {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

impl ProviderAdapter for Searxng {
    fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, params: &ProviderParams) -> Result<HttpRequest> {
        let mut request = HttpRequest::get(&self.base_url)
            .param("q", &params.query)
            .param("format", "json")
            .param("categories", "general");

        if let Some(recency) = params.recency {
            request = request.param("time_range", recency.as_str());
        }

        Ok(request)
    }

    fn response(&self, response: HttpResponse) -> Result<Vec<SourceRecord>> {
        response.error_for_status(&self.name)?;

        let parsed: SearxResponse = response.json()?;
        Ok(parsed
            .results
            .iter()
            .filter_map(|r| {
                build_record(
                    &self.name,
                    &r.title,
                    &r.url,
                    r.content.as_deref().unwrap_or_default(),
                    r.published_date.as_deref(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::query::RecencyWindow;
    use std::collections::HashMap;

    fn response(text: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: HashMap::new(),
            text: text.to_string(),
            url: String::new(),
        }
    }

    #[test]
    fn test_searxng_request() {
        let searx = Searxng::new("searxng", "http://127.0.0.1:8888/search");
        let params = ProviderParams {
            query: "tesla".to_string(),
            recency: Some(RecencyWindow::Year),
            count: 5,
        };
        let request = searx.request(&params).unwrap();
        assert!(request.params.contains(&("format".to_string(), "json".to_string())));
        assert!(request.params.contains(&("time_range".to_string(), "year".to_string())));
    }

    #[test]
    fn test_searxng_response() {
        let searx = Searxng::new("searxng", "http://127.0.0.1:8888/search");
        let records = searx
            .response(response(r#"{"query": "tesla", "results": [
                {"title": "Tesla", "url": "https://en.wikipedia.org/wiki/Tesla,_Inc.", "content": "American company", "publishedDate": null},
                {"title": "", "url": "https://skip.me"}
            ]}"#))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].snippet, "American company");
    }

    #[test]
    fn test_searxng_missing_results_is_malformed() {
        let searx = Searxng::new("searxng", "http://127.0.0.1:8888/search");
        assert!(matches!(
            searx.response(response("[]")),
            Err(SearchError::MalformedResponse(_))
        ));
    }
}
