//! Brave Search API provider

use super::traits::*;
use crate::error::{Result, SearchError};
use crate::network::{HttpRequest, HttpResponse};
use crate::query::RecencyWindow;
use crate::results::SourceRecord;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    page_age: Option<String>,
}

/// Brave web search (paid API, primary provider by default)
pub struct Brave {
    name: String,
    base_url: String,
    api_key: Option<String>,
}

impl Brave {
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

impl ProviderAdapter for Brave {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(1500)
    }

    fn request(&self, params: &ProviderParams) -> Result<HttpRequest> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SearchError::Config(format!("{}: api_key is required", self.name)))?;

        let mut request = HttpRequest::get(&self.base_url)
            .header("X-Subscription-Token", api_key)
            .param("q", &params.query)
            .param("count", params.count.min(20).to_string());

        if let Some(recency) = params.recency {
            let freshness = match recency {
                RecencyWindow::Day => "pd",
                RecencyWindow::Week => "pw",
                RecencyWindow::Month => "pm",
                RecencyWindow::Year => "py",
            };
            request = request.param("freshness", freshness);
        }

        Ok(request)
    }

    fn response(&self, response: HttpResponse) -> Result<Vec<SourceRecord>> {
        response.error_for_status(&self.name)?;

        let parsed: BraveResponse = response.json()?;
        let results = parsed.web.map(|w| w.results).unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|r| {
                build_record(
                    &self.name,
                    &r.title,
                    &r.url,
                    &r.description,
                    r.page_age.as_deref(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_brave_request() {
        let brave = Brave::new("brave", "https://api.search.brave.com/res/v1/web/search")
            .with_api_key(Some("key".into()));
        let params = ProviderParams {
            query: "rust programming".to_string(),
            recency: Some(RecencyWindow::Month),
            count: 50,
        };
        let request = brave.request(&params).unwrap();

        assert!(request.url.contains("brave.com"));
        assert_eq!(request.headers["X-Subscription-Token"], "key");
        assert!(request.params.contains(&("freshness".to_string(), "pm".to_string())));
        assert!(request.params.contains(&("count".to_string(), "20".to_string())));
    }

    #[test]
    fn test_brave_requires_key() {
        let brave = Brave::new("brave", "https://api.search.brave.com/res/v1/web/search");
        let params = ProviderParams {
            query: "x".to_string(),
            recency: None,
            count: 5,
        };
        assert!(matches!(brave.request(&params), Err(SearchError::Config(_))));
    }

    #[test]
    fn test_brave_response() {
        let brave = Brave::new("brave", "https://api.search.brave.com/res/v1/web/search");
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            text: r#"{"web": {"results": [
                {"title": "Tesla Q3", "url": "https://ir.tesla.com", "description": "Revenue <strong>grew</strong>", "page_age": "2024-10-23T20:05:00"}
            ]}}"#
                .to_string(),
            url: String::new(),
        };
        let records = brave.response(response).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].snippet, "Revenue grew");
        assert!(records[0].published_at.is_some());
    }

    #[test]
    fn test_brave_without_web_section_is_empty() {
        let brave = Brave::new("brave", "https://api.search.brave.com/res/v1/web/search");
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            text: r#"{"type": "search"}"#.to_string(),
            url: String::new(),
        };
        assert!(brave.response(response).unwrap().is_empty());
    }
}
