//! Text normalization shared by dedup, fingerprinting, ranking and citations

/// Case-fold and collapse whitespace; the dedup key for titles
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized query text used in cache fingerprints
pub fn normalize_query(text: &str) -> String {
    normalize_title(text)
}

/// Lower-case, replace non-alphanumerics with spaces, split on whitespace
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Tesla   Q3 Earnings\tBeat "),
            "tesla q3 earnings beat"
        );
        assert_eq!(normalize_title("TESLA"), normalize_title("tesla"));
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Tesla's Q3: revenue rose 8%!"),
            vec!["tesla", "s", "q3", "revenue", "rose", "8"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("  --- ...").is_empty());
    }
}
