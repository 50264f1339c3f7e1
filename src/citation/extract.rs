//! `[n]` marker extraction

use crate::results::{Citation, CitationMarker, RankedResultSet, SourceRecord};
use std::collections::HashSet;

struct Open {
    start: usize,
    nested: bool,
}

/// Find every top-level `[<digits>]` marker in `text`.
///
/// Brackets that contain other brackets (`[[1]]`, `[1[2]]`), unbalanced
/// brackets and non-digit contents are plain text.
pub fn extract_markers(text: &str) -> Vec<CitationMarker> {
    let mut markers = Vec::new();
    let mut stack: Vec<Open> = Vec::new();

    for (offset, ch) in text.char_indices() {
        match ch {
            '[' => {
                if let Some(top) = stack.last_mut() {
                    top.nested = true;
                }
                stack.push(Open {
                    start: offset,
                    nested: false,
                });
            }
            ']' => {
                let Some(open) = stack.pop() else {
                    continue;
                };
                if open.nested {
                    continue;
                }
                if let Some(outer) = stack.last_mut() {
                    outer.nested = true;
                    continue;
                }
                let inner = &text[open.start + 1..offset];
                if let Some(citation_id) = parse_id(inner) {
                    markers.push(CitationMarker {
                        citation_id,
                        start: open.start,
                        end: offset + 1,
                    });
                }
            }
            _ => {}
        }
    }

    // a bracket left open swallows any marker inside it
    if let Some(first_unclosed) = stack.first() {
        markers.retain(|m| m.start < first_unclosed.start);
    }

    markers
}

fn parse_id(inner: &str) -> Option<String> {
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    inner.parse::<usize>().ok().map(|n| n.to_string())
}

/// Distinct cited ids in order of first appearance, not yet verified
pub fn extract_citations(text: &str) -> Vec<Citation> {
    let mut seen = HashSet::new();
    extract_markers(text)
        .into_iter()
        .filter(|m| seen.insert(m.citation_id.clone()))
        .map(|m| Citation::unverified(m.citation_id))
        .collect()
}

/// The source a citation points at, if it exists
pub fn resolve<'a>(citation: &Citation, ranked: &'a RankedResultSet) -> Option<&'a SourceRecord> {
    ranked.get(&citation.citation_id)
}

/// Remove markers whose id is not in `allowed`
pub fn strip_markers(text: &str, allowed: &HashSet<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for marker in extract_markers(text) {
        if allowed.contains(&marker.citation_id) {
            continue;
        }
        out.push_str(&text[cursor..marker.start]);
        cursor = marker.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(text: &str) -> Vec<String> {
        extract_markers(text)
            .into_iter()
            .map(|m| m.citation_id)
            .collect()
    }

    #[test]
    fn test_simple_markers() {
        let text = "Revenue rose [1] while margins fell [3].";
        let markers = extract_markers(text);
        assert_eq!(ids(text), vec!["1", "3"]);
        assert_eq!(&text[markers[0].start..markers[0].end], "[1]");
    }

    #[test]
    fn test_nested_and_malformed_ignored() {
        assert!(ids("see [[1]]").is_empty());
        assert!(ids("see [1[2]]").is_empty());
        assert!(ids("see [a] and [] and [1a]").is_empty());
        assert_eq!(ids("stray ] then [2]"), vec!["2"]);
        assert!(ids("open [ then [2]").is_empty());
        assert_eq!(ids("[2] then open ["), vec!["2"]);
    }

    #[test]
    fn test_leading_zero_normalized() {
        assert_eq!(ids("[01]"), vec!["1"]);
    }

    #[test]
    fn test_extract_citations_distinct() {
        let citations = extract_citations("A [2]. B [1]. C [2].");
        let ids: Vec<_> = citations.iter().map(|c| c.citation_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(citations.iter().all(|c| !c.flagged && c.overlap_ratio == 0.0));
    }

    #[test]
    fn test_strip_markers() {
        let allowed: HashSet<String> = ["1".to_string()].into_iter().collect();
        assert_eq!(strip_markers("a [1] b [7] c", &allowed), "a [1] b  c");
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(ids("Tesla’s résumé [1] — ok [2]"), vec!["1", "2"]);
    }
}
