//! FTS4 match-query normalization.

/// Match-query text plus the number of words it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub formatted: String,
    pub word_count: usize,
}

impl NormalizedQuery {
    pub fn is_empty(&self) -> bool {
        self.formatted.is_empty()
    }

    /// Snippet window for this query: one token of context per word, plus one.
    pub fn snippet_tokens(&self) -> usize {
        self.word_count + 1
    }
}

fn is_query_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Upper-case words FTS4 reads as operators.
const QUERY_OPERATORS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

/// Strip quotes and edge punctuation from one user word.
///
/// Returns `None` when nothing searchable is left (`"("`, `"--"`).
fn clean_word(word: &str) -> Option<&str> {
    let word = word.trim_matches(|c: char| !c.is_alphanumeric());
    (!word.is_empty()).then_some(word)
}

/// Split on space/tab and clean every word, dropping the empty ones.
fn query_words(text: &str) -> Vec<String> {
    text.split(is_query_space)
        .map(|word| word.replace('"', ""))
        .filter_map(|word| clean_word(&word).map(str::to_string))
        .collect()
}

/// Whether a cleaned word must be quoted to be read as plain text.
///
/// Interior syntax characters (`weight0:hello`, `gpt-2`, `a*b`) and operator
/// keywords would otherwise change the meaning of the query or break it.
fn needs_quoting(word: &str) -> bool {
    word.chars().any(|c| !c.is_alphanumeric()) || QUERY_OPERATORS.contains(&word)
}

/// Normalize free text into an FTS4 prefix query.
///
/// - `"hello"` → `hello*` (1 word)
/// - `"  hello \t  world  "` → `hello world*` (2 words)
/// - `"gpt-2 model"` → `"gpt-2" model*` (2 words)
/// - `""` / `"   "` / `"("` → empty (0 words, no wildcard)
///
/// Only ASCII space and tab separate words. Double quotes and leading or
/// trailing punctuation are dropped; words with inner punctuation are quoted
/// as phrases so user text can never be parsed as query syntax.
pub fn normalize(text: &str) -> NormalizedQuery {
    let words = query_words(text);

    let last = words.len().saturating_sub(1);
    let formatted = words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let prefix = if i == last { "*" } else { "" };
            if needs_quoting(word) {
                format!("\"{}{}\"", word, prefix)
            } else {
                format!("{}{}", word, prefix)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    NormalizedQuery {
        formatted,
        word_count: words.len(),
    }
}

/// The cleaned words joined as one phrase, prefix on the last word.
fn phrase(text: &str) -> NormalizedQuery {
    let words = query_words(text);

    if words.is_empty() {
        return NormalizedQuery {
            formatted: String::new(),
            word_count: 0,
        };
    }

    NormalizedQuery {
        formatted: format!("\"{}*\"", words.join(" ")),
        word_count: words.len(),
    }
}

/// Normalize and, when asked, quote the whole query as one phrase.
///
/// Phrase mode matches the words adjacently with a prefix on the last one:
/// `"project sta"` → `"project sta*"`.
pub fn format_query(text: &str, prefer_phrase: bool) -> NormalizedQuery {
    if prefer_phrase {
        phrase(text)
    } else {
        normalize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(query: NormalizedQuery) -> (String, usize) {
        (query.formatted, query.word_count)
    }

    #[test]
    fn test_normalize_single_word() {
        assert_eq!(pair(normalize("hello")), ("hello*".to_string(), 1));
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            pair(normalize("  hello   world  ")),
            ("hello world*".to_string(), 2)
        );
        assert_eq!(
            pair(normalize("\tone\t \ttwo three\t")),
            ("one two three*".to_string(), 3)
        );
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(pair(normalize("")), (String::new(), 0));
        assert_eq!(pair(normalize(" \t  ")), (String::new(), 0));
    }

    #[test]
    fn test_normalize_drops_quotes() {
        assert_eq!(
            pair(normalize("say \"hi\" there")),
            ("say hi there*".to_string(), 3)
        );
        assert_eq!(pair(normalize("\"\"")), (String::new(), 0));
    }

    #[test]
    fn test_normalize_drops_bare_punctuation() {
        assert_eq!(pair(normalize("(")), (String::new(), 0));
        assert_eq!(pair(normalize("( ) -- ^")), (String::new(), 0));
        assert_eq!(pair(normalize("hello)")), ("hello*".to_string(), 1));
        assert_eq!(pair(normalize("-draft* (final)")), ("draft final*".to_string(), 2));
    }

    #[test]
    fn test_normalize_quotes_inner_syntax() {
        assert_eq!(
            pair(normalize("weight0:hello")),
            ("\"weight0:hello*\"".to_string(), 1)
        );
        assert_eq!(
            pair(normalize("gpt-2 model")),
            ("\"gpt-2\" model*".to_string(), 2)
        );
        assert_eq!(
            pair(normalize("cats AND dogs OR")),
            ("cats \"AND\" dogs \"OR*\"".to_string(), 4)
        );
        assert_eq!(pair(normalize("and")), ("and*".to_string(), 1));
    }

    #[test]
    fn test_normalize_is_stable_on_clean_input() {
        let once = normalize("status report");
        let again = normalize(once.formatted.trim_end_matches('*'));
        assert_eq!(once, again);
    }

    #[test]
    fn test_phrase_formatting() {
        assert_eq!(
            pair(format_query(" project  sta ", true)),
            ("\"project sta*\"".to_string(), 2)
        );
        assert_eq!(pair(format_query("project", false)), ("project*".to_string(), 1));
        assert_eq!(pair(format_query("   ", true)), (String::new(), 0));
        assert_eq!(
            pair(format_query("(status) weight0:rep", true)),
            ("\"status weight0:rep*\"".to_string(), 2)
        );
    }

    #[test]
    fn test_snippet_tokens() {
        assert_eq!(normalize("a b c").snippet_tokens(), 4);
        assert_eq!(normalize("").snippet_tokens(), 1);
    }
}
