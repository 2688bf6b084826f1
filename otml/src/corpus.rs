//! `corpus.txt` parsing: a set of observed surface word forms, optionally
//! partitioned into lexical categories by a `_CATEGORY` suffix.

use std::collections::BTreeMap;

use crate::errors::Result;

/// The default category words without a `_CATEGORY` suffix are filed
/// under.
pub const DEFAULT_CATEGORY: &str = "default";

/// A parsed corpus: surface forms grouped by lexical category, in the
/// order first encountered.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    by_category: BTreeMap<String, Vec<String>>,
}

impl Corpus {
    /// Parses `corpus.txt`'s content. Accepts either whitespace-separated
    /// surface strings or a list-literal form (`[w1, w2, ...]`); either
    /// may contain per-word `_CATEGORY` suffixes (spec.md §6).
    pub fn parse(data: &str) -> Result<Self> {
        let trimmed = data.trim();
        let tokens: Vec<&str> = if let Some(inner) = strip_list_literal(trimmed) {
            inner
                .split(',')
                .map(str::trim)
                .map(|t| t.trim_matches(|c| c == '"' || c == '\''))
                .filter(|t| !t.is_empty())
                .collect()
        } else {
            trimmed.split_whitespace().collect()
        };

        let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for token in tokens {
            let (word, category) = match token.rsplit_once('_') {
                Some((word, category)) if !category.is_empty() && category.chars().all(char::is_alphanumeric) => {
                    (word, category)
                }
                _ => (token, DEFAULT_CATEGORY),
            };
            by_category.entry(category.to_string()).or_default().push(word.to_string());
        }
        Ok(Self { by_category })
    }

    /// Every observed surface word form across all categories, duplicates
    /// included.
    pub fn all_words(&self) -> Vec<&str> {
        self.by_category.values().flatten().map(String::as_str).collect()
    }

    /// The words filed under `category`.
    pub fn category(&self, category: &str) -> &[String] {
        self.by_category.get(category).map_or(&[], Vec::as_slice)
    }

    /// The distinct category labels present.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.by_category.keys().map(String::as_str)
    }

    /// Repeats the corpus according to `corpus_duplication_factor`: the
    /// integer part gives full repetitions, the fractional part a prefix
    /// of the (category-flattened) word list repeated once more.
    pub fn duplicate(&self, factor: f64) -> Vec<String> {
        let base = self.all_words();
        if base.is_empty() || factor <= 0.0 {
            return Vec::new();
        }
        let whole = factor.trunc() as usize;
        let fraction = factor.fract();
        let mut out = Vec::with_capacity(base.len() * (whole + 1));
        for _ in 0..whole {
            out.extend(base.iter().map(|s| s.to_string()));
        }
        let prefix_len = ((base.len() as f64) * fraction).round() as usize;
        out.extend(base.iter().take(prefix_len).map(|s| s.to_string()));
        out
    }
}

fn strip_list_literal(s: &str) -> Option<&str> {
    let s = s.strip_prefix('[')?;
    s.strip_suffix(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whitespace_separated_words() {
        let corpus = Corpus::parse("abb bab baa").unwrap();
        assert_eq!(corpus.all_words().len(), 3);
    }

    #[test]
    fn parses_list_literal_words() {
        let corpus = Corpus::parse("[abb, bab, \"baa\"]").unwrap();
        assert_eq!(corpus.all_words().len(), 3);
    }

    #[test]
    fn partitions_by_category_suffix() {
        let corpus = Corpus::parse("bba_N aab_V bb").unwrap();
        assert_eq!(corpus.category("N"), ["bba".to_string()]);
        assert_eq!(corpus.category("V"), ["aab".to_string()]);
        assert_eq!(corpus.category(DEFAULT_CATEGORY), ["bb".to_string()]);
    }

    #[test]
    fn duplication_factor_repeats_then_takes_a_prefix() {
        let corpus = Corpus::parse("a b c").unwrap();
        let duplicated = corpus.duplicate(1.5);
        assert_eq!(duplicated.len(), 4);
    }
}
