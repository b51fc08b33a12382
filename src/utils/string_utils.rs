//! Text normalization helpers shared by the normalizer and deduplicator.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse runs of whitespace into single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Fold text for fuzzy comparison: lowercase, strip punctuation,
/// collapse whitespace. "Jazz Night!!" and "jazz night" fold equal.
#[must_use]
pub fn fold_for_matching(text: &str) -> String {
    let lowered: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&lowered)
}

/// Derive a URL-friendly slug from a title, truncated to `max_len`.
///
/// Non-alphanumeric runs become single dashes; the result never starts
/// or ends with a dash and never splits mid-word at the length cap.
#[must_use]
pub fn slugify(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true; // suppress leading dash

    for c in title.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                slug.push(lc);
            }
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.len() > max_len {
        let mut cut = max_len;
        while cut > 0 && !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
        if let Some(pos) = slug.rfind('-') {
            slug.truncate(pos);
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_whitespace_flattens_runs() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn fold_strips_punctuation_and_case() {
        assert_eq!(fold_for_matching("Jazz Night!!"), "jazz night");
        assert_eq!(fold_for_matching("  JAZZ   night "), "jazz night");
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Jazz Night at the Fortezza!", 100), "jazz-night-at-the-fortezza");
    }

    #[test]
    fn slugify_truncates_on_word_boundary() {
        assert_eq!(slugify("alpha beta gamma", 12), "alpha-beta");
    }

    #[test]
    fn slugify_handles_greek_text() {
        assert_eq!(slugify("Συναυλία στο Ηράκλειο", 100), "συναυλία-στο-ηράκλειο");
    }
}
