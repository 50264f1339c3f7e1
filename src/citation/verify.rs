//! Overlap verification of cited sentences against their sources

use super::extract::extract_markers;
use crate::query::tokenize;
use crate::results::{Citation, CitationMarker, RankedResultSet};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tracing::debug;

/// Default ratio below which a citation is flagged
pub const DEFAULT_THRESHOLD: f64 = 0.08;

/// Byte ranges of sentences; a boundary is `.`, `!` or `?` followed by whitespace
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(next, after)) = chars.peek() {
                if after.is_whitespace() {
                    push_trimmed(&mut spans, text, start..offset + ch.len_utf8());
                    start = next;
                }
            }
        }
    }
    push_trimmed(&mut spans, text, start..text.len());
    spans
}

fn push_trimmed(spans: &mut Vec<Range<usize>>, text: &str, span: Range<usize>) {
    let slice = &text[span.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let start = span.start + leading;
    if start < span.end {
        spans.push(start..span.end);
    }
}

/// Jaccard similarity of two token sets
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn sentence_tokens(text: &str, span: &Range<usize>, markers: &[CitationMarker]) -> HashSet<String> {
    let mut cleaned = String::with_capacity(span.len());
    let mut cursor = span.start;
    for marker in markers
        .iter()
        .filter(|m| m.start >= span.start && m.end <= span.end)
    {
        cleaned.push_str(&text[cursor..marker.start]);
        cleaned.push(' ');
        cursor = marker.end;
    }
    cleaned.push_str(&text[cursor..span.end]);
    tokenize(&cleaned).into_iter().collect()
}

/// Score every cited id in `text` against its source.
///
/// One entry per distinct id, first-appearance order, best overlap across
/// its occurrences. Ids without a source are kept with ratio 0 and flagged.
/// The text itself is never changed.
pub fn verify(text: &str, ranked: &RankedResultSet, threshold: f64) -> Vec<Citation> {
    let markers = extract_markers(text);
    if markers.is_empty() {
        return Vec::new();
    }
    let spans = sentence_spans(text);

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Option<f64>> = HashMap::new();
    let mut source_tokens: HashMap<String, HashSet<String>> = HashMap::new();

    for marker in &markers {
        let id = &marker.citation_id;
        if !best.contains_key(id) {
            order.push(id.clone());
        }

        let Some(source) = ranked.get(id) else {
            best.entry(id.clone()).or_insert(None);
            continue;
        };
        let source_set = source_tokens
            .entry(id.clone())
            .or_insert_with(|| tokenize(&source.scoring_text()).into_iter().collect());

        let ratio = spans
            .iter()
            .find(|s| s.contains(&marker.start))
            .map(|span| jaccard(&sentence_tokens(text, span, &markers), source_set))
            .unwrap_or(0.0);

        let slot = best.entry(id.clone()).or_insert(Some(ratio));
        if let Some(current) = slot {
            if ratio > *current {
                *current = ratio;
            }
        }
    }

    order
        .into_iter()
        .map(|id| {
            let ratio = best.get(&id).copied().flatten();
            match ratio {
                Some(overlap_ratio) => Citation {
                    flagged: overlap_ratio < threshold,
                    overlap_ratio,
                    citation_id: id,
                },
                None => {
                    debug!("Citation [{}] has no matching source", id);
                    Citation {
                        citation_id: id,
                        overlap_ratio: 0.0,
                        flagged: true,
                    }
                }
            }
        })
        .collect()
}
