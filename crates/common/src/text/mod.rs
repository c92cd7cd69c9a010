//! Legal text tokenizer shared by the lexical index and the hashing embedder.
//!
//! Lowercases, expands the statute abbreviations `s.` / `ss.` before splitting on
//! non-alphanumeric characters, then drops English stop words and legal
//! boilerplate. Tokens starting with a digit (`27`, `9a`, `2007`) are always kept
//! because they carry section numbers and years.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
        "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
        "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
        "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
        "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
        "for", "with", "about", "against", "between", "into", "through", "during", "before",
        "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
        "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
        "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will", "just",
        "don", "should", "now", "would", "could", "shall", "may", "must",
        // Legal boilerplate
        "act", "section", "subsection", "paragraph", "clause", "part", "division",
    ]
    .into_iter()
    .collect()
});

/// Whether a lowercased token is a stop word
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Tokenize statute or query text into index terms
pub fn tokenize(text: &str) -> Vec<String> {
    let expanded = expand_abbreviations(&text.to_lowercase());

    expanded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| keep_token(token))
        .map(str::to_string)
        .collect()
}

/// Whitespace-separated words, used for token budget estimates
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn keep_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        return true;
    }
    token.chars().count() > 2 && !is_stop_word(token)
}

/// Rewrite `s. 15` as `section 15` and `ss. 15` as `sections 15`
fn expand_abbreviations(lower: &str) -> String {
    let chars: Vec<char> = lower.chars().collect();
    let mut out = String::with_capacity(lower.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let at_boundary = i == 0 || !chars[i - 1].is_alphanumeric();
        if at_boundary && chars[i] == 's' {
            let (word, len) = if chars.get(i + 1) == Some(&'s') && chars.get(i + 2) == Some(&'.') {
                ("sections", 3)
            } else if chars.get(i + 1) == Some(&'.') {
                ("section", 2)
            } else {
                ("", 0)
            };

            if len > 0 {
                let mut j = i + len;
                while chars.get(j).is_some_and(|c| c.is_whitespace()) {
                    j += 1;
                }
                if chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
                    out.push_str(word);
                    out.push(' ');
                    i = j;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}
