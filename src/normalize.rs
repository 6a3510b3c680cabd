use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Filler words that carry no identity signal.
pub const STOPWORDS: &[&str] = &["the", "and", "of", "to", "in", "on", "for", "de", "la"];

/// Words that open a featured-artist credit in a track title.
pub const FEATURE_MARKERS: &[&str] = &["ft", "feat", "featuring", "with", "and"];

/// Lowercases, strips diacritics and punctuation, and collapses whitespace.
/// Letters of any script survive.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .filter(|c| !matches!(c, '\'' | '’' | '‘' | '`' | '´'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct tokens of an already-normalized string, in first-seen order,
/// keeping words longer than one character that are not stopwords.
pub fn tokens(normalized: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in normalized.split_whitespace() {
        if word.chars().count() <= 1 || STOPWORDS.contains(&word) {
            continue;
        }
        if !out.iter().any(|w| w == word) {
            out.push(word.to_string());
        }
    }
    out
}

/// Cuts a normalized track title at its featured-artist credit, if any.
/// The first word never counts as a credit, so "With You" stays intact.
pub fn strip_feature_suffix(normalized: &str) -> String {
    let words: Vec<&str> = normalized.split_whitespace().collect();
    match words
        .iter()
        .skip(1)
        .position(|w| FEATURE_MARKERS.contains(w))
    {
        Some(idx) => words[..idx + 1].join(" "),
        None => words.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        assert_eq!(normalize("Adele - Hello (Official Video)"), "adele hello official video");
        assert_eq!(normalize("  Don't   Stop!! "), "dont stop");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize("Beyoncé — Déjà Vu"), "beyonce deja vu");
        assert_eq!(normalize("Sigur Rós"), "sigur ros");
    }

    #[test]
    fn keeps_non_latin_scripts() {
        assert_eq!(normalize("מרדכי בן דוד"), "מרדכי בן דוד");
        // Hebrew vowel points are diacritics too.
        assert_eq!(normalize("שָׁלוֹם"), "שלום");
        assert_eq!(normalize("東京事変"), "東京事変");
    }

    #[test]
    fn tokens_drop_short_words_stopwords_and_duplicates() {
        assert_eq!(
            tokens("the best of a man and the man"),
            vec!["best".to_string(), "man".to_string()]
        );
        assert!(tokens("").is_empty());
    }

    #[test]
    fn feature_suffix_is_removed() {
        assert_eq!(strip_feature_suffix("hello feat drake"), "hello");
        assert_eq!(strip_feature_suffix("rise up ft the crew"), "rise up");
        assert_eq!(strip_feature_suffix("rock and roll"), "rock");
        assert_eq!(strip_feature_suffix("with you"), "with you");
        assert_eq!(strip_feature_suffix("hello"), "hello");
        assert_eq!(strip_feature_suffix(""), "");
    }
}
