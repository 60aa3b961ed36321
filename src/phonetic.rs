//! Phonetic normalization - maps mis-heard transcripts onto canonical command tokens
//!
//! Recognizers stutter ("cut cut", "twoo") and mishear short words ("cup" for
//! "cut", "for" for "4"). Normalization cleans the text, collapses repeats, then
//! looks the phrase up in a correction table, first as a whole and then word by
//! word.

use std::collections::HashMap;

use crate::config::PhoneticConfig;

/// Correction table: collapsed mis-heard phrase -> canonical phrase
#[derive(Debug, Clone, Default)]
pub struct PhoneticTable {
    entries: HashMap<String, String>,
}

impl PhoneticTable {
    /// Build a table. Keys go through the same cleaning and collapsing as
    /// input text so that e.g. "three" still matches the collapsed "thre".
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| {
                (
                    collapse_repeats(&clean_phrase(k.as_ref())),
                    clean_phrase(v.as_ref()),
                )
            })
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();
        // Later keys win on collisions; sort so the winner doesn't depend on hash order
        pairs.sort();

        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn from_config(config: &PhoneticConfig) -> Self {
        Self::new(config.table())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, phrase: &str) -> Option<&str> {
        self.entries.get(phrase).map(String::as_str)
    }

    /// Map a transcript onto its canonical phrase. Never fails; text with no
    /// applicable correction comes back cleaned but otherwise unchanged.
    pub fn normalize(&self, phrase: &str) -> String {
        let collapsed = collapse_repeats(&clean_phrase(phrase));
        if collapsed.is_empty() {
            return collapsed;
        }

        if let Some(canonical) = self.lookup(&collapsed) {
            return canonical.to_string();
        }

        let mapped: Vec<&str> = collapsed
            .split(' ')
            .map(|word| self.lookup(word).unwrap_or(word))
            .collect();

        // Mapping can make neighbours equal ("two too" -> "2 2")
        let joined = dedup_words(&mapped.join(" "));
        // Word-level fixes can complete a phrase ("m too" -> "m 2" -> "m2")
        match self.lookup(&joined) {
            Some(canonical) => canonical.to_string(),
            None => joined,
        }
    }
}

/// Lowercase, strip punctuation around words, squeeze whitespace
pub fn clean_phrase(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse stutter artifacts: repeated words, then repeated characters within a word
pub fn collapse_repeats(text: &str) -> String {
    dedup_words(text)
        .split(' ')
        .map(dedup_chars)
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedup_words(text: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if words.last() != Some(&word) {
            words.push(word);
        }
    }
    words.join(" ")
}

fn dedup_chars(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev: Option<char> = None;
    for c in word.chars() {
        if prev == Some(c) && c.is_alphanumeric() {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_phonetic_table;

    fn table() -> PhoneticTable {
        PhoneticTable::new(builtin_phonetic_table())
    }

    #[test]
    fn test_clean_phrase() {
        assert_eq!(clean_phrase("  Two. "), "two");
        assert_eq!(clean_phrase("P1,  Cut!"), "p1 cut");
        assert_eq!(clean_phrase("m-one"), "m-one");
        assert_eq!(clean_phrase("   "), "");
    }

    #[test]
    fn test_collapse_repeats() {
        assert_eq!(collapse_repeats("cut cut cut"), "cut");
        assert_eq!(collapse_repeats("cuttt"), "cut");
        assert_eq!(collapse_repeats("two two cut"), "two cut");
        assert_eq!(collapse_repeats("cut two cut"), "cut two cut");
    }

    #[test]
    fn test_whole_phrase_preferred() {
        let t = table();
        assert_eq!(t.normalize("to cut"), "2 cut");
        assert_eq!(t.normalize("pick 2 cut"), "p2 cut");
        assert_eq!(t.normalize("P one"), "p1");
    }

    #[test]
    fn test_word_by_word_fallback() {
        let t = table();
        assert_eq!(t.normalize("four cut"), "4 cut");
        assert_eq!(t.normalize("Three"), "3");
        assert_eq!(t.normalize("camera seven"), "camera 7");
    }

    #[test]
    fn test_stutter_correction() {
        let t = table();
        assert_eq!(t.normalize("cut cut"), "cut");
        assert_eq!(t.normalize("cuup"), "cut");
        assert_eq!(t.normalize("two too"), "2");
    }

    #[test]
    fn test_word_fixes_complete_a_phrase() {
        let t = table();
        assert_eq!(t.normalize("court mix"), "cut");
        assert_eq!(t.normalize("m too"), "m2");
        assert_eq!(t.normalize("p too"), "p2");
        assert_eq!(t.normalize("m won"), "m won");
    }

    #[test]
    fn test_unmapped_text_is_cleaned_only() {
        let t = table();
        assert_eq!(t.normalize("Banana!"), "banana");
        assert_eq!(t.normalize("test"), "test");
        assert_eq!(t.normalize(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let t = table();
        let phrases = [
            "two",
            "four cut",
            "to cut",
            "p two",
            "m one cut",
            "cut mix",
            "court",
            "seven seven",
            "pick 2 cut",
            "switch to three",
            "testing one two",
            "court mix",
            "m too",
            "p too",
        ];
        for phrase in phrases {
            let once = t.normalize(phrase);
            assert_eq!(t.normalize(&once), once, "not idempotent for '{}'", phrase);
        }
    }

    #[test]
    fn test_custom_table() {
        let t = PhoneticTable::new([("Slides", "p1"), ("Wide Shot", "3")]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.normalize("slides"), "p1");
        assert_eq!(t.normalize("wide shot"), "3");
        assert_eq!(t.normalize("wide"), "wide");
    }
}
