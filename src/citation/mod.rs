//! Citation engine
//!
//! Extracts `[n]` markers from generated text, checks each cited sentence
//! against its source and renders hover-able markup. Verification is
//! advisory: it annotates citations but never rewrites the text.

mod extract;
mod markup;
mod verify;

pub use extract::{extract_citations, extract_markers, resolve, strip_markers};
pub use markup::{render_markup, truncate_chars, DEFAULT_PREVIEW_CHARS};
pub use verify::{jaccard, sentence_spans, verify, DEFAULT_THRESHOLD};

use crate::config::CitationSettings;
use crate::results::{Citation, RankedResultSet};

/// Citation engine bound to its configured threshold and preview length
#[derive(Debug, Clone)]
pub struct CitationEngine {
    threshold: f64,
    preview_chars: usize,
}

impl CitationEngine {
    pub fn new(settings: &CitationSettings) -> Self {
        Self {
            threshold: settings.threshold,
            preview_chars: settings.preview_chars,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn verify(&self, text: &str, ranked: &RankedResultSet) -> Vec<Citation> {
        verify(text, ranked, self.threshold)
    }

    pub fn render(&self, text: &str, ranked: &RankedResultSet) -> String {
        render_markup(text, ranked, self.preview_chars)
    }
}

impl Default for CitationEngine {
    fn default() -> Self {
        Self::new(&CitationSettings::default())
    }
}
