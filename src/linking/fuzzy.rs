use crate::linking::{alphanumeric_tokens, Candidate, LinkError, Scorer};
use itertools::Itertools;
use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

/// Similarity of two strings on a 0-100 scale, rounded to the closest integer. An empty string is
/// similar to nothing.
pub fn ratio(first: &str, second: &str) -> f64 {
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    (normalized_levenshtein(first, second) * 100.0).round()
}

/// Order-insensitive similarity of two texts on a 0-100 scale.
///
/// Both texts are reduced to their sets of lowercased alphanumeric tokens. The shared tokens are
/// sorted and joined, then compared with each text's shared tokens followed by its own remaining
/// tokens. The best of the three pairwise `ratio`s is returned, so a text whose words are all
/// found in the other one scores 100.
pub fn token_set_ratio(first: &str, second: &str) -> f64 {
    let first: BTreeSet<String> = alphanumeric_tokens(first).collect();
    let second: BTreeSet<String> = alphanumeric_tokens(second).collect();
    if first.is_empty() || second.is_empty() {
        return 0.0;
    }
    let intersection = first.intersection(&second).join(" ");
    let combined = |own: &BTreeSet<String>, other: &BTreeSet<String>| {
        let difference = own.difference(other).join(" ");
        format!("{} {}", intersection, difference).trim().to_string()
    };
    let first_combined = combined(&first, &second);
    let second_combined = combined(&second, &first);
    [
        ratio(&intersection, &first_combined),
        ratio(&intersection, &second_combined),
        ratio(&first_combined, &second_combined),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

/// Scores candidates with the `token_set_ratio` of the mention and the vocabulary text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl Scorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score(&self, mention: &str, candidate: &Candidate) -> Result<f64, LinkError> {
        Ok(token_set_ratio(mention, &candidate.vocabulary_text))
    }
}
