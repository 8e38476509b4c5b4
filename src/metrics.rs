/*!
This module turns match counts into precision, recall and F1, and reduces the metrics of many
documents into corpus-level averages.
*/
use crate::matching::MatchResult;
use crate::reporter::OverallAverage;
use ndarray::Array1;
use ndarray_stats::{
    errors::{MultiInputError, ShapeMismatch},
    SummaryStatisticsExt,
};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
    str::FromStr,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
/// How do we handle cases with a division by zero? Do we replace the result by 1, return an
/// error, or replace the result by 0? Reporting `0.0` for an empty denominator is the usual
/// convention and the default. `ReturnError` stops the computation; it can be useful if you
/// believe there should be no 0 in the denominator.
pub enum DivByZeroStrat {
    /// Returns 1 when the denominator is 0
    ReplaceBy1,
    /// Returns an error
    ReturnError,
    /// Returns 0 when the denominator is 0
    #[default]
    ReplaceBy0,
}

#[derive(Debug)]
pub struct ParsingDivisionByZeroStrategyError<S: Debug + Display>(S);

impl<S: Debug + Display> Display for ParsingDivisionByZeroStrategyError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse the string ({}) into a `DivByZeroStrat`",
            self.0
        )
    }
}
impl<S: Debug + Display> Error for ParsingDivisionByZeroStrategyError<S> {}

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby1" | "replacebyone" | "one" => Ok(DivByZeroStrat::ReplaceBy1),
            "replaceby0" | "replacebyzero" | "zero" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

/// The metric whose denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Precision,
    Recall,
}

impl Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionByZeroError(pub Metric);

impl Display for DivisionByZeroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered division by zero when computing the {}", self.0)
    }
}

impl Error for DivisionByZeroError {}

#[derive(Debug, Clone, PartialEq)]
/// Enum error encompassing the failures that could happen when computing the precision, recall
/// and F1 of a document or of a corpus.
pub enum ComputationError {
    DivisionByZero(DivisionByZeroError),
    InputError(MultiInputError),
}

impl Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero(div_err) => std::fmt::Display::fmt(&div_err, f),
            Self::InputError(input_err) => std::fmt::Display::fmt(&input_err, f),
        }
    }
}
impl Error for ComputationError {}

impl From<DivisionByZeroError> for ComputationError {
    fn from(value: DivisionByZeroError) -> Self {
        Self::DivisionByZero(value)
    }
}

impl From<MultiInputError> for ComputationError {
    fn from(value: MultiInputError) -> Self {
        Self::InputError(value)
    }
}

/// Precision, recall and F1 of a single match outcome, or an average of many.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl Metrics {
    /// Computes the metrics from raw counts.
    ///
    /// * `true_positives`: Number of matches
    /// * `false_positives`: Number of unmatched predictions
    /// * `false_negatives`: Number of unmatched gold items
    /// * `zero_division`: What to do when a denominator is 0
    pub fn from_counts(
        true_positives: usize,
        false_positives: usize,
        false_negatives: usize,
        zero_division: DivByZeroStrat,
    ) -> Result<Self, DivisionByZeroError> {
        let precision = prf_divide(
            true_positives,
            true_positives + false_positives,
            Metric::Precision,
            zero_division,
        )?;
        let recall = prf_divide(
            true_positives,
            true_positives + false_negatives,
            Metric::Recall,
            zero_division,
        )?;
        let denominator = precision + recall;
        let f1 = if denominator == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / denominator
        };
        Ok(Metrics {
            precision,
            recall,
            f1,
        })
    }

    pub fn from_match(
        result: &MatchResult,
        zero_division: DivByZeroStrat,
    ) -> Result<Self, DivisionByZeroError> {
        Self::from_counts(
            result.true_positives,
            result.false_positives,
            result.false_negatives,
            zero_division,
        )
    }
}

fn prf_divide(
    numerator: usize,
    denominator: usize,
    metric: Metric,
    zero_division: DivByZeroStrat,
) -> Result<f32, DivisionByZeroError> {
    if denominator != 0 {
        return Ok(numerator as f32 / denominator as f32);
    }
    debug!(%metric, "zero denominator");
    match zero_division {
        DivByZeroStrat::ReplaceBy0 => Ok(0.0),
        DivByZeroStrat::ReplaceBy1 => Ok(1.0),
        DivByZeroStrat::ReturnError => Err(DivisionByZeroError(metric)),
    }
}

/// Reduces the per-document outcomes of one strategy into a corpus-level average.
///
/// * `Macro`: unweighted mean of the per-document metrics.
/// * `Micro`: metrics of the counts summed over the documents.
/// * `Weighted`: mean of the per-document metrics weighted by their gold support. Falls back to the
///   macro average when no document has any support.
///
/// An empty corpus yields `0.0` for every metric.
///
/// * `results`: Match outcome of every document
/// * `per_document`: Metrics of every document, in the same order as `results`
/// * `average`: Which average to compute
/// * `zero_division`: What to do when a micro denominator is 0
pub fn average_metrics(
    results: &[MatchResult],
    per_document: &[Metrics],
    average: OverallAverage,
    zero_division: DivByZeroStrat,
) -> Result<Metrics, ComputationError> {
    if results.len() != per_document.len() {
        return Err(ComputationError::InputError(MultiInputError::ShapeMismatch(
            ShapeMismatch {
                first_shape: vec![results.len()],
                second_shape: vec![per_document.len()],
            },
        )));
    }
    if per_document.is_empty() {
        return Ok(Metrics::default());
    }
    let precision = Array1::from_iter(per_document.iter().map(|m| m.precision));
    let recall = Array1::from_iter(per_document.iter().map(|m| m.recall));
    let f1 = Array1::from_iter(per_document.iter().map(|m| m.f1));
    let macro_metrics = Metrics {
        precision: precision.mean().unwrap_or_default(),
        recall: recall.mean().unwrap_or_default(),
        f1: f1.mean().unwrap_or_default(),
    };
    match average {
        OverallAverage::Macro => Ok(macro_metrics),
        OverallAverage::Micro => {
            let (tp, fp, fn_) = results.iter().fold((0, 0, 0), |acc, r| {
                (
                    acc.0 + r.true_positives,
                    acc.1 + r.false_positives,
                    acc.2 + r.false_negatives,
                )
            });
            Ok(Metrics::from_counts(tp, fp, fn_, zero_division)?)
        }
        OverallAverage::Weighted => {
            let weights = Array1::from_iter(results.iter().map(|r| r.gold_considered as f32));
            if weights.sum() == 0.0 {
                debug!("no gold support in the corpus, using the macro average");
                return Ok(macro_metrics);
            }
            Ok(Metrics {
                precision: precision.weighted_mean(&weights)?,
                recall: recall.weighted_mean(&weights)?,
                f1: f1.weighted_mean(&weights)?,
            })
        }
    }
}
