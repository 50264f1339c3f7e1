//! Prompt assembly from the frozen ranked set

use crate::citation::truncate_chars;
use crate::query::Query;
use crate::results::RankedResultSet;
use std::collections::HashSet;
use std::fmt::Write;

/// Prompt text and the source ids it exposes to the model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub included_ids: HashSet<String>,
}

/// Size limits applied while building a prompt
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_sources: usize,
    pub max_snippet_chars: usize,
}

/// Number the top sources with their frozen ids and append the question
pub fn build_prompt(
    query: &Query,
    ranked: &RankedResultSet,
    context: Option<&str>,
    limits: PromptLimits,
) -> Prompt {
    let mut text = String::new();
    let mut included_ids = HashSet::new();

    text.push_str("Sources:\n");
    for record in ranked.iter().take(limits.max_sources) {
        let _ = writeln!(text, "[{}] {}", record.id, record.title);
        let _ = writeln!(text, "URL: {}", record.url);
        if !record.snippet.is_empty() {
            let _ = writeln!(
                text,
                "{}",
                truncate_chars(&record.snippet, limits.max_snippet_chars)
            );
        }
        text.push('\n');
        included_ids.insert(record.id.clone());
    }

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(text, "Conversation so far:\n{}\n", context.trim());
    }
    let _ = write!(text, "Question: {}", query.text());

    Prompt { text, included_ids }
}
