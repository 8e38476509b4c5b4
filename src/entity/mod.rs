use ahash::{AHashMap, AHashSet};
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    error::Error,
    fmt::Display,
    ops::Deref,
    str::FromStr,
};
use tracing::debug;

pub(crate) mod parsing;
pub(crate) mod predicted;

pub use parsing::{parse_gold, parse_vocabulary, read_gold, read_vocabulary, GoldFilter, ParseError, ParseStats};
pub use predicted::{parse_predicted_spans, read_predicted_spans, write_predicted_spans};

/// An entity is a labeled span of a document. The `start` and `end` offsets are character offsets
/// of the half-open interval `[start, end)`. They can be absent when the entity only carries a
/// label and a text (e.g. predictions given as `[label, text]`).
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Entity<'a> {
    pub(crate) label: Cow<'a, str>,
    pub(crate) start: Option<usize>,
    pub(crate) end: Option<usize>,
    pub(crate) text: Cow<'a, str>,
}

impl<'a> Entity<'a> {
    /// Builds an entity with known offsets. Returns an error if `start > end`.
    pub fn new<L, T>(label: L, start: usize, end: usize, text: T) -> Result<Self, EntityError>
    where
        L: Into<Cow<'a, str>>,
        T: Into<Cow<'a, str>>,
    {
        if start > end {
            return Err(EntityError::InvalidSpan(start, end));
        }
        Ok(Entity {
            label: label.into(),
            start: Some(start),
            end: Some(end),
            text: text.into(),
        })
    }

    /// Builds an entity for label/text-only comparisons.
    pub fn without_offsets<L, T>(label: L, text: T) -> Self
    where
        L: Into<Cow<'a, str>>,
        T: Into<Cow<'a, str>>,
    {
        Entity {
            label: label.into(),
            start: None,
            end: None,
            text: text.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn start(&self) -> Option<usize> {
        self.start
    }
    pub fn end(&self) -> Option<usize> {
        self.end
    }
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the `(start, end)` pair if both offsets are known.
    pub fn span(&self) -> Option<(usize, usize)> {
        self.start.zip(self.end)
    }

    /// Does this entity carry the given label? The comparison is case-insensitive.
    pub fn has_label(&self, label: &str) -> bool {
        self.label.trim().to_lowercase() == label.trim().to_lowercase()
    }

    /// Detaches the entity from the buffer it was parsed from.
    pub fn into_owned(self) -> Entity<'static> {
        Entity {
            label: Cow::Owned(self.label.into_owned()),
            start: self.start,
            end: self.end,
            text: Cow::Owned(self.text.into_owned()),
        }
    }
}

impl<'a> Display for Entity<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span() {
            Some((start, end)) => write!(f, "({}, {}, {}, {})", self.label, start, end, self.text),
            None => write!(f, "({}, {})", self.label, self.text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityError {
    /// The start offset is greater than the end offset.
    InvalidSpan(usize, usize),
}

impl Display for EntityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSpan(start, end) => write!(
                f,
                "Invalid span: the start offset ({}) is greater than the end offset ({})",
                start, end
            ),
        }
    }
}
impl Error for EntityError {}

/// The entities of a single document, in input order. The order matters for the greedy matching
/// strategies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Entities<'a>(pub(crate) Vec<Entity<'a>>);

impl<'a> Entities<'a> {
    pub fn new(entities: Vec<Entity<'a>>) -> Self {
        Entities(entities)
    }

    /// Lowercased labels found in this document.
    pub fn unique_labels(&self) -> AHashSet<String> {
        self.0.iter().map(|e| e.label.trim().to_lowercase()).collect()
    }

    /// Entities with the given label (case-insensitive), in input order.
    pub fn filter<'b>(&'b self, label: &'b str) -> impl Iterator<Item = &'b Entity<'a>> + 'b {
        self.0.iter().filter(move |e| e.has_label(label))
    }

    pub fn into_owned(self) -> Entities<'static> {
        Entities(self.0.into_iter().map(Entity::into_owned).collect())
    }

    pub fn into_inner(self) -> Vec<Entity<'a>> {
        self.0
    }
}

impl<'a> Deref for Entities<'a> {
    type Target = [Entity<'a>];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> From<Vec<Entity<'a>>> for Entities<'a> {
    fn from(value: Vec<Entity<'a>>) -> Self {
        Entities(value)
    }
}

impl<'a> FromIterator<Entity<'a>> for Entities<'a> {
    fn from_iter<T: IntoIterator<Item = Entity<'a>>>(iter: T) -> Self {
        Entities(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for Entities<'a> {
    type Item = Entity<'a>;
    type IntoIter = std::vec::IntoIter<Entity<'a>>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Canonical labels of the evaluation taxonomy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize,
)]
pub enum Label {
    Drug,
    Disease,
    Symptom,
    ADR,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Drug => "Drug",
            Label::Disease => "Disease",
            Label::Symptom => "Symptom",
            Label::ADR => "ADR",
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelParsingError(String);

impl Display for LabelParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Impossible to parse the string ({}) into a Label", self.0)
    }
}
impl Error for LabelParsingError {}

impl FromStr for Label {
    type Err = LabelParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drug" => Ok(Label::Drug),
            "disease" => Ok(Label::Disease),
            "symptom" => Ok(Label::Symptom),
            "adr" => Ok(Label::ADR),
            _ => Err(LabelParsingError(String::from(s))),
        }
    }
}

/// Maps the raw labels of a classifier to the canonical labels. A raw label can fan out to
/// several canonical labels, in which case one entity is emitted per canonical label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    inner: AHashMap<String, Vec<Label>>,
}

impl LabelMap {
    /// An empty map. Every raw label is dropped until it is inserted.
    pub fn new() -> Self {
        LabelMap {
            inner: AHashMap::default(),
        }
    }

    /// Maps `raw` to `labels`, replacing any previous mapping. Duplicated labels are ignored.
    pub fn insert<S: Into<String>>(&mut self, raw: S, labels: &[Label]) -> &mut Self {
        let mut deduped: Vec<Label> = Vec::with_capacity(labels.len());
        for label in labels {
            if !deduped.contains(label) {
                deduped.push(*label);
            }
        }
        self.inner.insert(raw.into(), deduped);
        self
    }

    /// Canonical labels of `raw`. `None` if the label is not mapped.
    pub fn get(&self, raw: &str) -> Option<&[Label]> {
        self.inner
            .get(raw)
            .map(|v| v.as_slice())
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Mapping of the biomedical NER model used to produce the predictions of the CADEC posts.
impl Default for LabelMap {
    fn default() -> Self {
        let mut map = LabelMap::new();
        map.insert("Drug", &[Label::Drug])
            .insert("Disease_disorder", &[Label::Disease])
            .insert("Sign_symptom", &[Label::Symptom, Label::ADR])
            .insert("Other_event", &[Label::ADR])
            .insert("Detailed_description", &[Label::ADR]);
        map
    }
}

/// A prediction as returned by the token classifier, before label mapping and merging. The
/// `word` is the surface form of the (sub)token and can contain markers such as `##`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    #[serde(alias = "entity_group", alias = "entity")]
    pub label: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub score: Option<f32>,
}

impl RawPrediction {
    pub fn new<S: Into<String>>(label: S, start: usize, end: usize) -> Self {
        RawPrediction {
            label: label.into(),
            start,
            end,
            word: String::new(),
            score: None,
        }
    }
}

/// Counters collected while converting raw predictions into entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConversionStats {
    /// Number of raw predictions received.
    pub predictions: usize,
    /// Predictions dropped because their label is not mapped.
    pub unmapped: usize,
    /// Predictions dropped because their offsets do not fit the document.
    pub malformed: usize,
    /// Predictions absorbed into the previous one.
    pub merged: usize,
    /// Entities emitted, after fan-out.
    pub emitted: usize,
}

/// Byte offset of every character boundary of a document, used to slice it with character
/// offsets.
pub(crate) struct CharOffsets(Box<[usize]>);

impl CharOffsets {
    pub(crate) fn new(document: &str) -> Self {
        let mut boundaries: Vec<usize> = document.char_indices().map(|(i, _)| i).collect();
        boundaries.push(document.len());
        CharOffsets(boundaries.into_boxed_slice())
    }

    /// Slices `document` between the character offsets `start` and `end`.
    pub(crate) fn slice<'a>(&self, document: &'a str, start: usize, end: usize) -> Option<&'a str> {
        if start > end {
            return None;
        }
        let byte_start = *self.0.get(start)?;
        let byte_end = *self.0.get(end)?;
        document.get(byte_start..byte_end)
    }
}

/// Pending entity while merging: canonical labels, start and end.
type Pending<'l> = (&'l [Label], usize, usize);

/// Maps the raw predictions to canonical labels and merges the contiguous ones.
///
/// Two consecutive predictions are merged when they map to the same canonical labels and the
/// second starts where the first ends. The text of a merged entity is re-sliced from the
/// `document`, never rebuilt from the token surface forms. Predictions with an unmapped label are
/// dropped; those whose offsets do not fit the document are dropped as malformed. Both are
/// counted in the returned `ConversionStats`.
///
/// * `predictions`: Raw predictions, in document order
/// * `document`: Text the offsets point into
/// * `label_map`: Raw label to canonical labels mapping
pub fn merge_predictions<'a>(
    predictions: &[RawPrediction],
    document: &'a str,
    label_map: &LabelMap,
) -> (Entities<'a>, ConversionStats) {
    let offsets = CharOffsets::new(document);
    let mut stats = ConversionStats {
        predictions: predictions.len(),
        ..ConversionStats::default()
    };
    let mut entities = Vec::with_capacity(predictions.len());
    let mut pending: Option<Pending> = None;
    for prediction in predictions {
        let Some(labels) = label_map.get(&prediction.label) else {
            debug!(label = %prediction.label, "dropping prediction with an unmapped label");
            stats.unmapped += 1;
            continue;
        };
        if offsets
            .slice(document, prediction.start, prediction.end)
            .is_none()
        {
            debug!(
                start = prediction.start,
                end = prediction.end,
                "dropping prediction with offsets outside of the document"
            );
            stats.malformed += 1;
            continue;
        }
        pending = match pending {
            Some((prev_labels, start, end))
                if prev_labels == labels && prediction.start == end =>
            {
                stats.merged += 1;
                Some((prev_labels, start, prediction.end))
            }
            Some(previous) => {
                flush(previous, document, &offsets, &mut entities);
                Some((labels, prediction.start, prediction.end))
            }
            None => Some((labels, prediction.start, prediction.end)),
        };
    }
    if let Some(previous) = pending {
        flush(previous, document, &offsets, &mut entities);
    }
    stats.emitted = entities.len();
    (Entities(entities), stats)
}

/// Emits one entity per canonical label of the pending span.
fn flush<'a>(
    pending: Pending,
    document: &'a str,
    offsets: &CharOffsets,
    entities: &mut Vec<Entity<'a>>,
) {
    let (labels, start, end) = pending;
    // Both bounds were checked when the pending span was built or extended.
    let text = offsets.slice(document, start, end).unwrap_or_default();
    for label in labels {
        entities.push(Entity {
            label: Cow::Borrowed(label.as_str()),
            start: Some(start),
            end: Some(end),
            text: Cow::Borrowed(text),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Failure of the external token classifier.
pub struct InferenceError(pub String);

impl Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Inference failed: {}", self.0)
    }
}
impl Error for InferenceError {}

/// Contract of the external token classifier producing raw predictions from a text.
pub trait Recognizer {
    fn recognize(&self, text: &str) -> Result<Vec<RawPrediction>, InferenceError>;
}

/// Runs the recognizer on `text` and converts its raw predictions into entities. A recognizer
/// failure is returned as is; no partial result is produced.
pub fn predict_entities<'a, R: Recognizer + ?Sized>(
    recognizer: &R,
    text: &'a str,
    label_map: &LabelMap,
) -> Result<(Entities<'a>, ConversionStats), InferenceError> {
    let raw = recognizer.recognize(text)?;
    Ok(merge_predictions(&raw, text, label_map))
}
