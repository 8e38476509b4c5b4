/*!
Linking of adverse reaction mentions to vocabulary entries.

A `Scorer` rates how well a vocabulary `Candidate` describes a mention, and `best_match` keeps the
highest rated candidate. Two scorers are provided: the `LexicalScorer`, a token set ratio on a
0-100 scale, and the `EmbeddingScorer`, a cosine similarity between the vectors of an `Encoder`.
`link_document` runs both on every mention and reports them side by side.
*/
use crate::entity::{Entity, Label};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::Display,
};
use tracing::debug;

pub(crate) mod embedding;
pub(crate) mod fuzzy;

pub use embedding::{
    cosine_similarity, EmbeddingScorer, Encoder, EncoderError, EncoderHandle, HashingEncoder,
};
pub use fuzzy::{ratio, token_set_ratio, LexicalScorer};

/// A vocabulary entry that a mention can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub vocabulary_text: String,
}

impl Candidate {
    pub fn new<C: Into<String>, T: Into<String>>(code: C, vocabulary_text: T) -> Self {
        Candidate {
            code: code.into(),
            vocabulary_text: vocabulary_text.into(),
        }
    }

    /// Candidates without a code cannot be linked to.
    pub fn is_eligible(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

#[derive(Debug)]
pub enum LinkError {
    Encoder(EncoderError),
    /// Two vectors of different dimensions were compared.
    DimensionMismatch(usize, usize),
    /// The encoder returned a number of vectors different from the number of texts.
    WrongVectorCount { expected: usize, actual: usize },
    /// A scorer returned a number of scores different from the number of candidates.
    WrongScoreCount { expected: usize, actual: usize },
}

impl Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoder(encoder_err) => std::fmt::Display::fmt(encoder_err, f),
            Self::DimensionMismatch(first, second) => write!(
                f,
                "Cannot compare vectors of dimensions {} and {}",
                first, second
            ),
            Self::WrongVectorCount { expected, actual } => write!(
                f,
                "The encoder returned {} vectors for {} texts",
                actual, expected
            ),
            Self::WrongScoreCount { expected, actual } => write!(
                f,
                "The scorer returned {} scores for {} candidates",
                actual, expected
            ),
        }
    }
}
impl Error for LinkError {}

impl From<EncoderError> for LinkError {
    fn from(value: EncoderError) -> Self {
        Self::Encoder(value)
    }
}

/// Rates how well a candidate describes a mention. Higher is better; the scale is the scorer's own.
pub trait Scorer {
    /// Name of the scorer, used in reports.
    fn name(&self) -> &str;

    fn score(&self, mention: &str, candidate: &Candidate) -> Result<f64, LinkError>;

    /// Scores every candidate. The returned scores are in the order of `candidates`. Scorers can
    /// override it to batch their work.
    fn score_all(&self, mention: &str, candidates: &[&Candidate]) -> Result<Vec<f64>, LinkError> {
        candidates
            .iter()
            .map(|candidate| self.score(mention, candidate))
            .collect()
    }
}

/// The best candidate of a mention and its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Outcome of linking a mention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LinkOutcome {
    Matched(ScoredCandidate),
    /// There was no eligible candidate to choose from.
    NoMatch,
}

impl LinkOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Matched(scored) => Some(scored.score),
            Self::NoMatch => None,
        }
    }

    /// The score, or `default` when there was no match.
    pub fn score_or(&self, default: f64) -> f64 {
        self.score().unwrap_or(default)
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        match self {
            Self::Matched(scored) => Some(&scored.candidate),
            Self::NoMatch => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.candidate().map(|c| c.code.as_str())
    }
}

/// Selects the candidate with the highest score. Ties are broken in favor of the first candidate;
/// candidates without a code are ignored and `NaN` scores never win. Without any eligible
/// candidate, the outcome is `LinkOutcome::NoMatch`.
///
/// * `scorer`: How the candidates are rated
/// * `mention`: Text of the mention
/// * `candidates`: Vocabulary entries to choose from
pub fn best_match<S: Scorer + ?Sized>(
    scorer: &S,
    mention: &str,
    candidates: &[Candidate],
) -> Result<LinkOutcome, LinkError> {
    let eligible: Vec<&Candidate> = candidates.iter().filter(|c| c.is_eligible()).collect();
    if eligible.is_empty() {
        debug!(mention, scorer = scorer.name(), "no eligible candidate");
        return Ok(LinkOutcome::NoMatch);
    }
    let scores = scorer.score_all(mention, &eligible)?;
    if scores.len() != eligible.len() {
        return Err(LinkError::WrongScoreCount {
            expected: eligible.len(),
            actual: scores.len(),
        });
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.into_iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }
    Ok(match best {
        Some((i, score)) => LinkOutcome::Matched(ScoredCandidate {
            candidate: eligible[i].clone(),
            score,
        }),
        None => LinkOutcome::NoMatch,
    })
}

/// Both linking outcomes of a mention. They are reported side by side, never merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkComparison {
    pub mention: String,
    pub span: Option<(usize, usize)>,
    pub lexical: LinkOutcome,
    pub embedding: LinkOutcome,
}

impl LinkComparison {
    /// Did both scorers choose the same code?
    pub fn agrees(&self) -> bool {
        match (self.lexical.code(), self.embedding.code()) {
            (Some(lexical), Some(embedding)) => lexical == embedding,
            _ => false,
        }
    }
}

/// The linking outcomes of every mention of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkReport {
    pub document: String,
    pub comparisons: Vec<LinkComparison>,
}

impl LinkReport {
    /// Number of mentions for which both scorers chose the same code.
    pub fn agreements(&self) -> usize {
        self.comparisons.iter().filter(|c| c.agrees()).count()
    }
}

/// The gold entities labeled as adverse drug reactions, in input order.
pub fn adr_mentions<'a>(entities: &[Entity<'a>]) -> Vec<Entity<'a>> {
    entities
        .iter()
        .filter(|e| e.has_label(Label::ADR.as_str()))
        .cloned()
        .collect()
}

/// Links every mention with both scorers.
///
/// * `mentions`: Mentions to link, usually the `adr_mentions` of a document
/// * `candidates`: Vocabulary entries of the document
/// * `lexical`: First scorer
/// * `embedding`: Second scorer
pub fn link_document<L, E>(
    mentions: &[Entity],
    candidates: &[Candidate],
    lexical: &L,
    embedding: &E,
) -> Result<Vec<LinkComparison>, LinkError>
where
    L: Scorer + ?Sized,
    E: Scorer + ?Sized,
{
    mentions
        .iter()
        .map(|mention| {
            Ok(LinkComparison {
                mention: mention.text().to_string(),
                span: mention.span(),
                lexical: best_match(lexical, mention.text(), candidates)?,
                embedding: best_match(embedding, mention.text(), candidates)?,
            })
        })
        .collect()
}

/// Lowercased alphanumeric runs of a text.
pub(crate) fn alphanumeric_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores every candidate with a fixed value, by code.
    struct TableScorer(Vec<(&'static str, f64)>);

    impl Scorer for TableScorer {
        fn name(&self) -> &str {
            "table"
        }
        fn score(&self, _mention: &str, candidate: &Candidate) -> Result<f64, LinkError> {
            Ok(self
                .0
                .iter()
                .find(|(code, _)| *code == candidate.code)
                .map(|(_, s)| *s)
                .unwrap_or(f64::NAN))
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("X1", "feeling sick"),
            Candidate::new("X2", "nausea"),
            Candidate::new("X3", "vomiting"),
        ]
    }

    #[test]
    fn test_lexical_scorer_picks_the_same_words() {
        let actual = best_match(&LexicalScorer, "nausea", &candidates()).unwrap();
        assert_eq!(actual.code(), Some("X2"));
        assert_eq!(actual.score(), Some(100.0));
    }

    #[test]
    fn test_ties_break_on_the_first_candidate() {
        let scorer = TableScorer(vec![("X1", 0.5), ("X2", 0.9), ("X3", 0.9)]);
        let actual = best_match(&scorer, "nausea", &candidates()).unwrap();
        assert_eq!(actual.code(), Some("X2"));
    }

    #[test]
    fn test_nan_scores_never_win() {
        let scorer = TableScorer(vec![("X2", -1.0)]);
        let actual = best_match(&scorer, "nausea", &candidates()).unwrap();
        assert_eq!(actual.code(), Some("X2"));
        let scorer = TableScorer(vec![]);
        let actual = best_match(&scorer, "nausea", &candidates()).unwrap();
        assert_eq!(actual, LinkOutcome::NoMatch);
    }

    #[test]
    fn test_no_candidate_is_no_match() {
        let actual = best_match(&LexicalScorer, "nausea", &[]).unwrap();
        assert_eq!(actual, LinkOutcome::NoMatch);
        assert_eq!(actual.score(), None);
        assert_eq!(actual.score_or(0.0), 0.0);
    }

    #[test]
    fn test_candidates_without_code_are_ignored() {
        let candidates = vec![Candidate::new(" ", "nausea"), Candidate::new("X1", "sick")];
        let actual = best_match(&LexicalScorer, "nausea", &candidates).unwrap();
        assert_eq!(actual.code(), Some("X1"));
        let actual = best_match(&LexicalScorer, "nausea", &candidates[..1]).unwrap();
        assert_eq!(actual, LinkOutcome::NoMatch);
    }

    struct ShortScorer;
    impl Scorer for ShortScorer {
        fn name(&self) -> &str {
            "short"
        }
        fn score(&self, _mention: &str, _candidate: &Candidate) -> Result<f64, LinkError> {
            Ok(1.0)
        }
        fn score_all(&self, _mention: &str, _candidates: &[&Candidate]) -> Result<Vec<f64>, LinkError> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_wrong_number_of_scores_is_an_error() {
        let actual = best_match(&ShortScorer, "nausea", &candidates());
        assert!(matches!(
            actual,
            Err(LinkError::WrongScoreCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_link_document_reports_both_scorers() {
        let mentions = vec![
            Entity::new("ADR", 9, 15, "nausea").unwrap(),
            Entity::new("ADR", 20, 32, "feeling sick").unwrap(),
        ];
        let embedding = EmbeddingScorer::new(EncoderHandle::new(HashingEncoder::new(64)));
        let actual = link_document(&mentions, &candidates(), &LexicalScorer, &embedding).unwrap();
        assert_eq!(actual.len(), 2);
        assert_eq!(actual[0].lexical.code(), Some("X2"));
        assert_eq!(actual[0].embedding.code(), Some("X2"));
        assert_eq!(actual[1].lexical.code(), Some("X1"));
        assert_eq!(actual[1].embedding.code(), Some("X1"));
        assert!(actual.iter().all(|c| c.agrees()));
        assert_eq!(actual[1].span, Some((20, 32)));
    }

    #[test]
    fn test_adr_mentions() {
        let entities = vec![
            Entity::new("ADR", 0, 6, "nausea").unwrap(),
            Entity::new("Drug", 10, 15, "zocor").unwrap(),
            Entity::new("adr", 20, 24, "rash").unwrap(),
        ];
        let actual: Vec<_> = adr_mentions(&entities)
            .into_iter()
            .map(|e| e.text().to_string())
            .collect();
        assert_eq!(actual, vec!["nausea", "rash"]);
    }

    #[test]
    fn test_alphanumeric_tokens() {
        let actual: Vec<_> = alphanumeric_tokens("Muscle-PAIN, 2x!").collect();
        assert_eq!(actual, vec!["muscle", "pain", "2x"]);
    }
}
