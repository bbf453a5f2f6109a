//! Near-duplicate removal by word-set Jaccard similarity.
//!
//! Batches are generated concurrently with no shared context, so the same
//! textbook question often comes back twice with slightly different wording.
//! A candidate is dropped when its token set overlaps an already-kept
//! question's set at or above the similarity threshold. First occurrence
//! wins, so the relative order of kept questions is preserved.

use crate::question::GeneratedQuestion;
use std::collections::HashSet;

/// Similarity at which two questions are treated as the same question.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Common English function words that carry no topical signal.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "which", "who", "whom", "whose", "when",
    "where", "why", "how", "that", "this", "these", "those", "with", "from", "into", "onto",
    "has", "have", "had", "its", "their", "there", "then", "than", "but", "not", "all", "any",
    "can", "will", "would", "should", "could", "does", "did", "following", "given", "find",
    "value", "one", "each", "per", "you", "your", "our",
];

/// Lowercased content words of `text`, longer than two characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// `|a ∩ b| / |a ∪ b|`; zero when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Drop every question whose similarity to an earlier kept question is at
/// least `threshold`. Returns the kept questions and the number removed.
pub fn deduplicate(
    questions: Vec<GeneratedQuestion>,
    threshold: f64,
) -> (Vec<GeneratedQuestion>, usize) {
    let mut kept: Vec<GeneratedQuestion> = Vec::with_capacity(questions.len());
    let mut kept_tokens: Vec<HashSet<String>> = Vec::with_capacity(questions.len());
    let mut removed = 0;

    for question in questions {
        let tokens = tokenize(&question.question);
        if kept_tokens.iter().any(|seen| jaccard(seen, &tokens) >= threshold) {
            removed += 1;
            continue;
        }
        kept_tokens.push(tokens);
        kept.push(question);
    }

    (kept, removed)
}
