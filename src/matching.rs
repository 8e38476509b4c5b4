/*!
Matching of predicted entities against gold entities. Each `MatchStrategy` decides what counts as a
match and how the matches are counted:

* `Exact`, `ExactOffset` and `TokenLevel` compare sets of keys. Duplicated keys count once.
* `RelaxedOverlap` and `WordPresence` are greedy: the predicted entities are visited in input order
  and each one is paired with the first gold entity that qualifies and is not paired yet. This is
  not a maximum matching, and it must stay that way for the scores to be comparable.

Labels are always compared case-insensitively.
*/
use crate::entity::Entity;
use ahash::AHashSet;
use enum_iterator::Sequence;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::Display,
    hash::Hash,
    str::FromStr,
};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("WORD regex is invalid"));

/// The five ways of deciding whether a predicted entity matches a gold entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Sequence,
    Serialize,
    Deserialize,
)]
pub enum MatchStrategy {
    /// Same label and same normalized text.
    Exact,
    /// Same label, same offsets and same normalized text.
    ExactOffset,
    /// Same label and overlapping offsets.
    RelaxedOverlap,
    /// Shared `(label, token)` pairs over the whole document.
    TokenLevel,
    /// Same label and at least one shared token.
    WordPresence,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "Exact",
            Self::ExactOffset => "ExactOffset",
            Self::RelaxedOverlap => "RelaxedOverlap",
            Self::TokenLevel => "TokenLevel",
            Self::WordPresence => "WordPresence",
        }
    }

    /// Does this strategy pair entities greedily (as opposed to comparing sets of keys)?
    pub fn is_greedy(&self) -> bool {
        matches!(self, Self::RelaxedOverlap | Self::WordPresence)
    }
}

impl Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParsingError(String);

impl Display for StrategyParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into a MatchStrategy",
            self.0
        )
    }
}
impl Error for StrategyParsingError {}

impl FromStr for MatchStrategy {
    type Err = StrategyParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "exact" => Ok(Self::Exact),
            "exact-offset" | "exactoffset" | "offset" => Ok(Self::ExactOffset),
            "relaxed" | "relaxed-overlap" | "relaxedoverlap" | "overlap" => {
                Ok(Self::RelaxedOverlap)
            }
            "token" | "token-level" | "tokenlevel" => Ok(Self::TokenLevel),
            "word" | "word-presence" | "wordpresence" => Ok(Self::WordPresence),
            _ => Err(StrategyParsingError(String::from(s))),
        }
    }
}

/// A predicted entity paired with a gold entity by a greedy strategy. Both are indices into the
/// compared slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MatchedPair {
    pub predicted: usize,
    pub gold: usize,
}

/// Outcome of matching the predicted entities of a document against its gold entities.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MatchResult {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Number of gold items compared: distinct keys for the set strategies, entities otherwise.
    pub gold_considered: usize,
    /// Number of predicted items compared: distinct keys for the set strategies, entities
    /// otherwise.
    pub predicted_considered: usize,
    /// Pairs found by the greedy strategies. `None` for the set strategies.
    pub pairs: Option<Vec<MatchedPair>>,
}

/// Do the half-open intervals `[s1, e1)` and `[s2, e2)` overlap?
pub fn overlap(s1: usize, e1: usize, s2: usize, e2: usize) -> bool {
    s1.max(s2) < e1.min(e2)
}

/// Lowercases the text and collapses its whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().join(" ").to_lowercase()
}

/// Splits the text into its `\w+` tokens, as they appear in the text.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    WORD.find_iter(text).map(|m| m.as_str())
}

fn label_key(entity: &Entity) -> String {
    entity.label().trim().to_lowercase()
}

/// Matches the `predicted` entities of a document against its `gold` entities.
///
/// The function is pure: calling it twice with the same inputs gives the same result.
///
/// * `gold`: Gold entities of the document, in input order
/// * `predicted`: Predicted entities of the document, in input order
/// * `strategy`: What counts as a match
pub fn match_entities(gold: &[Entity], predicted: &[Entity], strategy: MatchStrategy) -> MatchResult {
    match strategy {
        MatchStrategy::Exact => {
            let key = |e: &Entity| (label_key(e), normalize_text(e.text()));
            set_match(
                gold.iter().map(key).collect(),
                predicted.iter().map(key).collect(),
            )
        }
        MatchStrategy::ExactOffset => {
            let key = |e: &Entity| (label_key(e), e.start(), e.end(), normalize_text(e.text()));
            set_match(
                gold.iter().map(key).collect(),
                predicted.iter().map(key).collect(),
            )
        }
        MatchStrategy::TokenLevel => {
            let keys = |entities: &[Entity]| -> AHashSet<(String, String)> {
                entities
                    .iter()
                    .flat_map(|e| {
                        let label = label_key(e);
                        tokenize(e.text())
                            .map(move |t| (label.clone(), t.to_lowercase()))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            };
            set_match(keys(gold), keys(predicted))
        }
        MatchStrategy::RelaxedOverlap => {
            let gold_labels: Vec<String> = gold.iter().map(label_key).collect();
            let predicted_labels: Vec<String> = predicted.iter().map(label_key).collect();
            greedy_match(gold.len(), predicted.len(), |p, g| {
                if predicted_labels[p] != gold_labels[g] {
                    return false;
                }
                match (predicted[p].span(), gold[g].span()) {
                    (Some((s1, e1)), Some((s2, e2))) => overlap(s1, e1, s2, e2),
                    _ => false,
                }
            })
        }
        MatchStrategy::WordPresence => {
            let gold_labels: Vec<String> = gold.iter().map(label_key).collect();
            let predicted_labels: Vec<String> = predicted.iter().map(label_key).collect();
            let token_sets = |entities: &[Entity]| -> Vec<AHashSet<String>> {
                entities
                    .iter()
                    .map(|e| tokenize(e.text()).map(String::from).collect())
                    .collect()
            };
            let gold_tokens = token_sets(gold);
            let predicted_tokens = token_sets(predicted);
            greedy_match(gold.len(), predicted.len(), |p, g| {
                predicted_labels[p] == gold_labels[g]
                    && !predicted_tokens[p].is_disjoint(&gold_tokens[g])
            })
        }
    }
}

/// `TP = |G ∩ P|`, `FP = |P \ G|`, `FN = |G \ P|`.
fn set_match<K: Hash + Eq>(gold: AHashSet<K>, predicted: AHashSet<K>) -> MatchResult {
    let true_positives = gold.intersection(&predicted).count();
    MatchResult {
        true_positives,
        false_positives: predicted.len() - true_positives,
        false_negatives: gold.len() - true_positives,
        gold_considered: gold.len(),
        predicted_considered: predicted.len(),
        pairs: None,
    }
}

/// First-match pairing in input order. A gold entity is paired at most once.
///
/// * `n_gold`: Number of gold entities
/// * `n_predicted`: Number of predicted entities
/// * `qualifies`: Does the predicted entity `p` match the gold entity `g`?
fn greedy_match<F>(n_gold: usize, n_predicted: usize, qualifies: F) -> MatchResult
where
    F: Fn(usize, usize) -> bool,
{
    let mut used = vec![false; n_gold];
    let mut pairs = Vec::new();
    for p in 0..n_predicted {
        if let Some(g) = (0..n_gold).find(|&g| !used[g] && qualifies(p, g)) {
            used[g] = true;
            pairs.push(MatchedPair {
                predicted: p,
                gold: g,
            });
        }
    }
    let matched = pairs.len();
    MatchResult {
        true_positives: matched,
        false_positives: n_predicted - matched,
        false_negatives: n_gold - matched,
        gold_considered: n_gold,
        predicted_considered: n_predicted,
        pairs: Some(pairs),
    }
}
