//! Query model
//!
//! A [`Query`] is immutable once issued. Raw user input may carry recency
//! bangs which are lifted into the filters:
//! - `!day`, `!week`, `!month`, `!year`

mod text;

pub use text::{normalize_query, normalize_title, tokenize};

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Recency filter for provider requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecencyWindow {
    Day,
    Week,
    Month,
    Year,
}

impl RecencyWindow {
    /// Get the string representation for API calls
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

impl std::fmt::Display for RecencyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecencyWindow {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Ok(Self::Day),
            "week" | "w" => Ok(Self::Week),
            "month" | "m" => Ok(Self::Month),
            "year" | "y" => Ok(Self::Year),
            other => Err(SearchError::Config(format!(
                "unknown recency window: {other}"
            ))),
        }
    }
}

/// Filters attached to a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub recency_window: Option<RecencyWindow>,
    pub max_results: usize,
}

/// An issued search query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    text: String,
    filters: Filters,
}

impl Query {
    /// Create a query from already-clean text
    pub fn new(
        text: impl Into<String>,
        recency_window: Option<RecencyWindow>,
        max_results: usize,
    ) -> Self {
        Self {
            text: text.into().split_whitespace().collect::<Vec<_>>().join(" "),
            filters: Filters {
                recency_window,
                max_results: max_results.max(1),
            },
        }
    }

    /// Parse raw input, lifting recency bangs into the filters
    pub fn parse(raw: &str, max_results: usize) -> Self {
        let mut recency_window = None;
        let mut words = Vec::new();

        for word in raw.split_whitespace() {
            let bang = match word.strip_prefix('!') {
                Some(bang) => bang,
                None => {
                    words.push(word);
                    continue;
                }
            };
            match bang.to_lowercase().as_str() {
                "day" => recency_window = Some(RecencyWindow::Day),
                "week" => recency_window = Some(RecencyWindow::Week),
                "month" => recency_window = Some(RecencyWindow::Month),
                "year" => recency_window = Some(RecencyWindow::Year),
                _ => words.push(word),
            }
        }

        Self::new(words.join(" "), recency_window, max_results)
    }

    /// Replace the recency filter, keeping an explicit one over a parsed one
    pub fn with_recency(mut self, recency_window: Option<RecencyWindow>) -> Self {
        if recency_window.is_some() {
            self.filters.recency_window = recency_window;
        }
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn max_results(&self) -> usize {
        self.filters.max_results
    }

    pub fn recency_window(&self) -> Option<RecencyWindow> {
        self.filters.recency_window
    }

    /// Check if query is empty after parsing
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
