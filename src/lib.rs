/*!
This library evaluates clinical entity mentions (drugs, diseases, symptoms and adverse drug
reactions) predicted in free-text posts against human gold annotations, and links adverse reaction
mentions to the entries of a standardized vocabulary.

# MATCHING STRATEGIES
The current strategies are supported:
* Exact: the labels and the normalized texts (lowercased, whitespace collapsed) are equal.
* ExactOffset: the labels, the offsets and the normalized texts are equal.
* RelaxedOverlap: the labels are equal and the character intervals overlap.
* TokenLevel: the `(label, token)` pairs of all the spans of a document are compared as sets.
* WordPresence: the labels are equal and the spans share at least one token.

Exact, ExactOffset and TokenLevel compare sets of keys. RelaxedOverlap and WordPresence pair the
entities greedily: each predicted entity, in input order, is paired with the first gold entity that
qualifies and is not paired yet.

# Terminology
* A span is a half-open character interval `[start, end)` of a document, with its text.
* An entity is a labeled span. Its label is usually one of the canonical labels `Drug`, `Disease`,
    `Symptom` and `ADR`.
* The raw labels of a token classifier are mapped to canonical labels by a `LabelMap`. A raw label
    can fan out to many canonical labels, producing one entity per canonical label.
* A candidate is a vocabulary entry (a code and its text) that a mention can be linked to.
* The macro-average of a corpus is the unweighted mean of the per-document metrics.
*/

mod config;
mod corpus;
mod entity;
mod linking;
mod matching;
mod metrics;
mod reporter;

// The public api starts here
pub use entity::{
    merge_predictions, parse_gold, parse_predicted_spans, parse_vocabulary, predict_entities,
    read_gold, read_predicted_spans, read_vocabulary, write_predicted_spans, ConversionStats,
    Entities, Entity, EntityError, GoldFilter, InferenceError, Label, LabelMap, LabelParsingError,
    ParseError, ParseStats, RawPrediction, Recognizer,
};

pub use matching::{
    match_entities, normalize_text, overlap, tokenize, MatchResult, MatchStrategy, MatchedPair,
    StrategyParsingError,
};

pub use metrics::{
    average_metrics, ComputationError, DivByZeroStrat, DivisionByZeroError, Metric, Metrics,
};

pub use reporter::{Average, OverallAverage, ReportRow, Reporter};

pub use config::{EvalConfig, EvalConfigBuilder};

pub use corpus::{
    document_id, evaluate_corpus, evaluate_document, link_corpus, read_ids, Corpus, CorpusError,
    CorpusLayout, CorpusReport, Document, DocumentEvaluation, DocumentSource,
};

pub use linking::{
    adr_mentions, best_match, cosine_similarity, link_document, ratio, token_set_ratio, Candidate,
    EmbeddingScorer, Encoder, EncoderError, EncoderHandle, HashingEncoder, LexicalScorer,
    LinkComparison, LinkError, LinkOutcome, LinkReport, ScoredCandidate, Scorer,
};

use reporter::ReportRowInner;

/// Main entrypoint of the library for a single document. This function matches the predicted
/// entities against the gold entities with every strategy of the config and computes their
/// precision, recall and F1. The returned structure can be used to prettyprint the results or be
/// converted into a `Vec` of rows. The rows carry the `Average::None` average.
///
/// * `gold`: Gold entities of the document
/// * `predicted`: Predicted entities of the document
/// * `config`: Strategies to evaluate and what to do on a division by zero
///
/// #Example
/// ```rust
/// use spaneval::{evaluate_conf, Average, EvalConfig, Entity, MatchStrategy};
///
/// let gold = vec![Entity::new("Drug", 0, 5, "zocor").unwrap()];
/// let predicted = vec![Entity::new("Drug", 0, 5, "Zocor").unwrap()];
///
/// let reporter = evaluate_conf(&gold, &predicted, &EvalConfig::default()).unwrap();
/// let exact = reporter.get(MatchStrategy::Exact, Average::None).unwrap();
///
/// assert_eq!(exact.f1, 1.0);
/// assert_eq!(reporter.rows().count(), 5);
/// ```
pub fn evaluate_conf(
    gold: &[Entity],
    predicted: &[Entity],
    config: &EvalConfig,
) -> Result<Reporter, ComputationError> {
    let mut reporter = Reporter {
        documents: 1,
        ..Reporter::default()
    };
    for &strategy in config.strategies() {
        let result = match_entities(gold, predicted, strategy);
        let metrics = Metrics::from_match(&result, config.zero_division())?;
        reporter.insert(ReportRowInner::new(
            strategy,
            Average::None,
            metrics,
            result.gold_considered,
        ));
    }
    Ok(reporter)
}
