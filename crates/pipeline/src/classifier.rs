//! Issue classification.
//!
//! The orchestrator depends only on the [`Classifier`] trait. The shipped
//! implementation, [`KeywordClassifier`], matches configured keywords against
//! the issue title and body; an implementation backed by an external text
//! analysis service can be dropped in without touching the orchestrator.

use std::collections::BTreeSet;

use crate::{Category, CategoryRule, Issue};

/// Maps an issue to zero or more categories.
///
/// Implementations must be deterministic for identical input so that reruns
/// are reproducible. Returning an empty set is valid; the caller substitutes
/// [`Category::unclassified`].
pub trait Classifier: Send + Sync {
    fn classify(&self, issue: &Issue) -> BTreeSet<Category>;
}

/// Case-insensitive, word-boundary keyword matching over title and body.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(Category, Vec<String>)>,
}

impl KeywordClassifier {
    /// Builds a classifier from category rules. Rules without keywords (such
    /// as the `unclassified` fallback) never match.
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|r| !r.name.is_unclassified())
            .map(|r| {
                let keywords = r
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (r.name.clone(), keywords)
            })
            .collect();
        Self { rules }
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, issue: &Issue) -> BTreeSet<Category> {
        let text = issue.text().to_lowercase();
        self.rules
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| contains_term(&text, k)))
            .map(|(category, _)| category.clone())
            .collect()
    }
}

/// Returns `true` if `term` occurs in `haystack` with non-alphanumeric
/// characters (or the string ends) on both sides. Both inputs are expected to
/// be lowercase already.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before_ok = haystack[..start].chars().next_back().is_none_or(|c| !is_word(c));
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word(c));
        before_ok && after_ok
    })
}
