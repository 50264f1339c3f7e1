//! Interactive citation markup

use super::extract::extract_markers;
use crate::results::{RankedResultSet, SourceRecord};

/// Default preview length in characters
pub const DEFAULT_PREVIEW_CHARS: usize = 160;

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

fn sup(marker_text: &str, source: &SourceRecord, preview_chars: usize) -> String {
    let preview = if source.snippet.is_empty() {
        &source.url
    } else {
        &source.snippet
    };
    format!(
        r#"<sup class="citation" data-citation-id="{}" data-title="{}" data-preview="{}">{}</sup>"#,
        html_escape(&source.id),
        html_escape(&source.title),
        html_escape(&truncate_chars(preview, preview_chars)),
        marker_text
    )
}

/// Wrap each resolvable `[n]` marker in a `<sup>` carrying the source's title
/// and preview. Markers without a source stay literal text.
pub fn render_markup(text: &str, ranked: &RankedResultSet, preview_chars: usize) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut cursor = 0;

    for marker in extract_markers(text) {
        let Some(source) = ranked.get(&marker.citation_id) else {
            continue;
        };
        out.push_str(&text[cursor..marker.start]);
        out.push_str(&sup(&text[marker.start..marker.end], source, preview_chars));
        cursor = marker.end;
    }
    out.push_str(&text[cursor..]);
    out
}
