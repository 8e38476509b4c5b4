/*!
Corpus-level evaluation. A `CorpusLayout` knows where the files of a document live; the documents
are loaded once, evaluated independently (optionally on a rayon pool) and reduced into a `Reporter`
in document order. Documents with a missing file are skipped and counted.
*/
use crate::config::EvalConfig;
use crate::entity::{
    read_gold, read_predicted_spans, read_vocabulary, Entities, GoldFilter, Label, ParseError,
};
use crate::linking::{adr_mentions, link_document, Candidate, LinkError, LinkReport, Scorer};
use crate::matching::{match_entities, MatchResult, MatchStrategy};
use crate::metrics::{average_metrics, ComputationError, Metrics};
use crate::reporter::{Average, OverallAverage, ReportRowInner, Reporter};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    error::Error,
    fmt::Display,
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// The gold and predicted entities of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub gold: Entities<'static>,
    pub predicted: Entities<'static>,
    /// Records of the gold and prediction files that could not be parsed.
    pub malformed: usize,
}

impl Document {
    pub fn new<S: Into<String>>(id: S, gold: Entities<'static>, predicted: Entities<'static>) -> Self {
        Document {
            id: id.into(),
            gold,
            predicted,
            malformed: 0,
        }
    }
}

/// Outcome of loading a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Loaded(Document),
    /// One of the files of the document does not exist.
    Missing { id: String, path: PathBuf },
}

#[derive(Debug)]
pub enum CorpusError {
    /// A file exists but cannot be read or parsed.
    Parse { path: PathBuf, source: ParseError },
    Computation(ComputationError),
    Link(LinkError),
}

impl Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::Computation(comp_err) => std::fmt::Display::fmt(comp_err, f),
            Self::Link(link_err) => std::fmt::Display::fmt(link_err, f),
        }
    }
}

impl Error for CorpusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            Self::Computation(comp_err) => Some(comp_err),
            Self::Link(link_err) => Some(link_err),
        }
    }
}

impl From<ComputationError> for CorpusError {
    fn from(value: ComputationError) -> Self {
        Self::Computation(value)
    }
}

impl From<LinkError> for CorpusError {
    fn from(value: LinkError) -> Self {
        Self::Link(value)
    }
}

/// Strips the whitespace and the `.txt` suffix of a document identifier.
pub fn document_id(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_suffix(".txt").unwrap_or(raw)
}

/// Reads a file listing one document identifier per line. Blank lines are ignored.
pub fn read_ids<P: AsRef<Path>>(path: P) -> Result<Vec<String>, CorpusError> {
    let path = path.as_ref();
    let content = read_to_string(path).map_err(|e| CorpusError::Parse {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    Ok(content
        .lines()
        .map(document_id)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect())
}

fn is_not_found(err: &ParseError) -> bool {
    matches!(err, ParseError::Io(io_err) if io_err.kind() == ErrorKind::NotFound)
}

/// Where the files of the documents live:
///
/// * gold annotations: `gold_dir/<id>.ann`
/// * predictions: `predictions_dir/<id>_predicted_spans.json`
/// * vocabulary-linked annotations: `vocabulary_dir/<id>.ann`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLayout {
    gold_dir: PathBuf,
    predictions_dir: PathBuf,
    vocabulary_dir: Option<PathBuf>,
    gold_filter: GoldFilter,
}

impl CorpusLayout {
    pub fn new<G: Into<PathBuf>, P: Into<PathBuf>>(gold_dir: G, predictions_dir: P) -> Self {
        CorpusLayout {
            gold_dir: gold_dir.into(),
            predictions_dir: predictions_dir.into(),
            vocabulary_dir: None,
            gold_filter: GoldFilter::All,
        }
    }

    pub fn with_vocabulary_dir<V: Into<PathBuf>>(mut self, vocabulary_dir: V) -> Self {
        self.vocabulary_dir = Some(vocabulary_dir.into());
        self
    }

    /// Which gold records are kept when loading a document.
    pub fn with_gold_filter(mut self, gold_filter: GoldFilter) -> Self {
        self.gold_filter = gold_filter;
        self
    }

    pub fn gold_path(&self, id: &str) -> PathBuf {
        self.gold_dir.join(format!("{}.ann", document_id(id)))
    }

    pub fn predictions_path(&self, id: &str) -> PathBuf {
        self.predictions_dir
            .join(format!("{}_predicted_spans.json", document_id(id)))
    }

    pub fn vocabulary_path(&self, id: &str) -> Option<PathBuf> {
        self.vocabulary_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.ann", document_id(id))))
    }

    /// Loads the gold and predicted entities of a document. A missing file is not an error: the
    /// document is reported as `DocumentSource::Missing`.
    pub fn load(&self, id: &str) -> Result<DocumentSource, CorpusError> {
        let id = document_id(id);
        let gold_path = self.gold_path(id);
        let (gold, gold_stats) = match read_gold(&gold_path, self.gold_filter) {
            Ok(read) => read,
            Err(e) if is_not_found(&e) => return Ok(missing(id, gold_path)),
            Err(source) => {
                return Err(CorpusError::Parse {
                    path: gold_path,
                    source,
                })
            }
        };
        let predictions_path = self.predictions_path(id);
        let (predicted, predicted_stats) = match read_predicted_spans(&predictions_path) {
            Ok(read) => read,
            Err(e) if is_not_found(&e) => return Ok(missing(id, predictions_path)),
            Err(source) => {
                return Err(CorpusError::Parse {
                    path: predictions_path,
                    source,
                })
            }
        };
        let malformed = gold_stats.malformed + predicted_stats.malformed;
        if malformed > 0 {
            debug!(id, malformed, "document loaded with malformed records");
        }
        Ok(DocumentSource::Loaded(Document {
            id: id.to_string(),
            gold,
            predicted,
            malformed,
        }))
    }

    /// Loads every document. Documents with a missing file are skipped and listed in
    /// `Corpus::skipped`.
    pub fn load_all<I, S>(&self, ids: I) -> Result<Corpus, CorpusError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut corpus = Corpus::default();
        for id in ids {
            match self.load(id.as_ref())? {
                DocumentSource::Loaded(document) => corpus.documents.push(document),
                DocumentSource::Missing { id, .. } => corpus.skipped.push(id),
            }
        }
        Ok(corpus)
    }

    /// Loads the gold ADR mentions and the vocabulary candidates of a document. `None` if one of the
    /// files is missing or if the layout has no vocabulary directory.
    pub fn load_linking(
        &self,
        id: &str,
    ) -> Result<Option<(Entities<'static>, Vec<Candidate>)>, CorpusError> {
        let id = document_id(id);
        let Some(vocabulary_path) = self.vocabulary_path(id) else {
            return Ok(None);
        };
        let candidates = match read_vocabulary(&vocabulary_path) {
            Ok((candidates, _)) => candidates,
            Err(e) if is_not_found(&e) => {
                warn!(path = %vocabulary_path.display(), "skipping document without vocabulary file");
                return Ok(None);
            }
            Err(source) => {
                return Err(CorpusError::Parse {
                    path: vocabulary_path,
                    source,
                })
            }
        };
        let gold_path = self.gold_path(id);
        let gold = match read_gold(&gold_path, GoldFilter::Only(Label::ADR)) {
            Ok((gold, _)) => gold,
            Err(e) if is_not_found(&e) => {
                warn!(path = %gold_path.display(), "skipping document without gold file");
                return Ok(None);
            }
            Err(source) => {
                return Err(CorpusError::Parse {
                    path: gold_path,
                    source,
                })
            }
        };
        Ok(Some((Entities::new(adr_mentions(&gold)), candidates)))
    }
}

fn missing(id: &str, path: PathBuf) -> DocumentSource {
    warn!(id, path = %path.display(), "skipping document with a missing file");
    DocumentSource::Missing {
        id: id.to_string(),
        path,
    }
}

/// The loaded documents of a corpus, and the identifiers of the skipped ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub skipped: Vec<String>,
}

impl Corpus {
    /// Malformed records of every loaded document.
    pub fn malformed(&self) -> usize {
        self.documents.iter().map(|d| d.malformed).sum()
    }
}

/// Outcome of one strategy on one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEvaluation {
    pub id: String,
    pub strategy: MatchStrategy,
    pub result: MatchResult,
    pub metrics: Metrics,
}

/// Evaluates every strategy of the config on a single document, in config order.
pub fn evaluate_document(
    document: &Document,
    config: &EvalConfig,
) -> Result<Vec<DocumentEvaluation>, ComputationError> {
    config
        .strategies
        .iter()
        .map(|&strategy| {
            let result = match_entities(&document.gold, &document.predicted, strategy);
            let metrics = Metrics::from_match(&result, config.zero_division)?;
            Ok(DocumentEvaluation {
                id: document.id.clone(),
                strategy,
                result,
                metrics,
            })
        })
        .collect()
}

/// Per-document outcomes and corpus averages of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusReport {
    /// Every document evaluation, in document order then config order.
    pub evaluations: Vec<DocumentEvaluation>,
    pub reporter: Reporter,
}

/// Evaluates every document of the corpus and reduces the outcomes of each strategy into its
/// macro, micro and weighted averages.
///
/// * `corpus`: Loaded documents and skipped identifiers
/// * `config`: Strategies, zero division strategy and parallelism
pub fn evaluate_corpus(corpus: &Corpus, config: &EvalConfig) -> Result<CorpusReport, ComputationError> {
    let per_document: Vec<Vec<DocumentEvaluation>> = if config.parallel {
        corpus
            .documents
            .par_iter()
            .map(|d| evaluate_document(d, config))
            .collect::<Result<_, _>>()?
    } else {
        corpus
            .documents
            .iter()
            .map(|d| evaluate_document(d, config))
            .collect::<Result<_, _>>()?
    };
    let evaluations: Vec<DocumentEvaluation> = per_document.into_iter().flatten().collect();
    let mut reporter = Reporter {
        documents: corpus.documents.len(),
        skipped: corpus.skipped.len(),
        malformed: corpus.malformed(),
        ..Reporter::default()
    };
    for &strategy in config.strategies.iter() {
        let (results, metrics): (Vec<MatchResult>, Vec<Metrics>) = evaluations
            .iter()
            .filter(|e| e.strategy == strategy)
            .map(|e| (e.result.clone(), e.metrics))
            .unzip();
        let support = results.iter().map(|r| r.gold_considered).sum();
        for average in OverallAverage::ALL {
            let overall = average_metrics(&results, &metrics, average, config.zero_division)?;
            reporter.insert(ReportRowInner::new(
                strategy,
                Average::from(average),
                overall,
                support,
            ));
        }
    }
    info!(
        documents = reporter.documents,
        skipped = reporter.skipped,
        malformed = reporter.malformed,
        "corpus evaluated"
    );
    Ok(CorpusReport {
        evaluations,
        reporter,
    })
}

/// Links the gold ADR mentions of every document to its vocabulary candidates. Documents with a
/// missing file are skipped.
///
/// * `layout`: Where the gold and vocabulary files live
/// * `ids`: Documents to link
/// * `lexical`: First scorer
/// * `embedding`: Second scorer
pub fn link_corpus<I, S, L, E>(
    layout: &CorpusLayout,
    ids: I,
    lexical: &L,
    embedding: &E,
) -> Result<Vec<LinkReport>, CorpusError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    L: Scorer + ?Sized,
    E: Scorer + ?Sized,
{
    let mut reports = Vec::new();
    for id in ids {
        let id = document_id(id.as_ref());
        let Some((mentions, candidates)) = layout.load_linking(id)? else {
            continue;
        };
        let comparisons = link_document(&mentions, &candidates, lexical, embedding)?;
        reports.push(LinkReport {
            document: id.to_string(),
            comparisons,
        });
    }
    info!(documents = reports.len(), "corpus linked");
    Ok(reports)
}
