/*!
This modules gives a few tools to prettyprint the metrics of every matching strategy, for a single
document or averaged over a corpus.
*/
use crate::matching::MatchStrategy;
use crate::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

/// The reporter holds the metrics of every matching strategy. It can be used to display the
/// results (i.e. prettyprint them) as if they were collected into a dataframe and can be consumed
/// to obtain the rows. The reporter can be built with the `evaluate_conf` function for a single
/// document or with `evaluate_corpus` for a corpus.
///
/// # Example
///
/// ```rust
/// use spaneval::{evaluate_conf, EvalConfigBuilder, Entity, MatchStrategy};
///
/// let gold = vec![Entity::new("ADR", 10, 21, "muscle pain").unwrap()];
/// let predicted = vec![Entity::new("ADR", 17, 21, "pain").unwrap()];
/// let config = EvalConfigBuilder::default()
///     .strategies(vec![MatchStrategy::Exact, MatchStrategy::RelaxedOverlap])
///     .build();
///
/// let reporter = evaluate_conf(&gold, &predicted, &config).unwrap();
///
/// let expected_report = "Strategy, Average, Precision, Recall, F1, Support
/// Exact, None, 0, 0, 0, 1
/// RelaxedOverlap, None, 1, 1, 1, 1\n";
///
/// assert_eq!(expected_report, reporter.to_string());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Reporter {
    pub(crate) rows: BTreeSet<ReportRowInner>,
    /// Number of evaluated documents.
    pub(crate) documents: usize,
    /// Number of documents skipped because one of their files is missing.
    pub(crate) skipped: usize,
    /// Number of records that could not be parsed in the evaluated documents.
    pub(crate) malformed: usize,
}

impl Reporter {
    pub(crate) fn insert(&mut self, row: ReportRowInner) -> bool {
        self.rows.insert(row)
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Metrics of the given strategy and average, if they were computed.
    pub fn get(&self, strategy: MatchStrategy, average: Average) -> Option<ReportRow> {
        self.rows
            .iter()
            .find(|r| r.strategy == strategy && r.average == average)
            .cloned()
            .map(ReportRow::from)
    }

    /// Keeps only the rows computed with one of the given averages.
    pub fn retain_averages(&mut self, averages: &[Average]) {
        self.rows.retain(|r| averages.contains(&r.average));
    }

    pub fn rows(&self) -> impl Iterator<Item = ReportRow> + '_ {
        self.rows.iter().cloned().map(ReportRow::from)
    }
}

/// By converting the reporter into a `Vec` of `ReportRow`, you keep the display order of the rows
/// but lose the document counters.
impl From<Reporter> for Vec<ReportRow> {
    fn from(value: Reporter) -> Self {
        value.rows.into_iter().map(ReportRow::from).collect()
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Strategy, Average, Precision, Recall, F1, Support")?;
        for v in self.rows.iter() {
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Datastructure holding the metrics of a strategy.
pub struct ReportRow {
    /// The matching strategy
    pub strategy: MatchStrategy,
    /// The average used to compute the metrics. `None` for a single document.
    pub average: Average,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Number of gold items considered
    pub support: usize,
}

impl ReportRow {
    pub fn metrics(&self) -> Metrics {
        Metrics {
            precision: self.precision,
            recall: self.recall,
            f1: self.f1,
        }
    }
}

impl From<ReportRowInner> for ReportRow {
    fn from(value: ReportRowInner) -> Self {
        Self {
            strategy: value.strategy,
            average: value.average,
            precision: value.metrics.precision,
            recall: value.metrics.recall,
            f1: value.metrics.f1,
            support: value.support,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// A row of the reporter. Rows are identified, compared and ordered by their strategy and their
/// average only, and are displayed as the line of a dataframe.
pub(crate) struct ReportRowInner {
    pub(crate) strategy: MatchStrategy,
    pub(crate) average: Average,
    pub(crate) metrics: Metrics,
    pub(crate) support: usize,
}

impl ReportRowInner {
    pub(crate) fn new(
        strategy: MatchStrategy,
        average: Average,
        metrics: Metrics,
        support: usize,
    ) -> Self {
        ReportRowInner {
            strategy,
            average,
            metrics,
            support,
        }
    }
}

impl PartialEq for ReportRowInner {
    fn eq(&self, other: &Self) -> bool {
        self.strategy == other.strategy && self.average == other.average
    }
}
impl Eq for ReportRowInner {}

impl PartialOrd for ReportRowInner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReportRowInner {
    fn cmp(&self, other: &Self) -> Ordering {
        self.strategy
            .cmp(&other.strategy)
            .then(self.average.cmp(&other.average))
    }
}

/// The row acts as a line in a dataframe when displayed.
impl Display for ReportRowInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.strategy,
            self.average,
            self.metrics.precision,
            self.metrics.recall,
            self.metrics.f1,
            self.support
        )
    }
}

/// Enumeration of the different types of averaging supported by this crate. `None` is used for the
/// metrics of a single document. &str can be parsed to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}
impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(AverageParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct AverageParsingError(String);
impl Display for AverageParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into an Average",
            self.0
        )
    }
}
impl std::error::Error for AverageParsingError {}

/// The averages computed over a corpus.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl OverallAverage {
    pub const ALL: [OverallAverage; 3] = [Self::Macro, Self::Micro, Self::Weighted];
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(strategy: MatchStrategy, average: Average, f1: f32) -> ReportRowInner {
        ReportRowInner::new(
            strategy,
            average,
            Metrics {
                precision: f1,
                recall: f1,
                f1,
            },
            2,
        )
    }

    #[test]
    fn test_rows_are_ordered_by_strategy_then_average() {
        let mut reporter = Reporter::default();
        reporter.insert(row(MatchStrategy::WordPresence, Average::Macro, 0.5));
        reporter.insert(row(MatchStrategy::Exact, Average::Weighted, 0.25));
        reporter.insert(row(MatchStrategy::Exact, Average::Micro, 1.0));
        let expected = "Strategy, Average, Precision, Recall, F1, Support
Exact, Micro, 1, 1, 1, 2
Exact, Weighted, 0.25, 0.25, 0.25, 2
WordPresence, Macro, 0.5, 0.5, 0.5, 2\n";
        assert_eq!(reporter.to_string(), expected);
    }

    #[test]
    fn test_rows_are_unique_per_strategy_and_average() {
        let mut reporter = Reporter::default();
        assert!(reporter.insert(row(MatchStrategy::Exact, Average::Macro, 0.5)));
        assert!(!reporter.insert(row(MatchStrategy::Exact, Average::Macro, 1.0)));
        let actual = reporter.get(MatchStrategy::Exact, Average::Macro).unwrap();
        assert_eq!(actual.f1, 0.5);
        assert!(reporter.get(MatchStrategy::Exact, Average::Micro).is_none());
    }

    #[test]
    fn test_reporter_into_rows() {
        let mut reporter = Reporter::default();
        reporter.insert(row(MatchStrategy::TokenLevel, Average::None, 0.75));
        let rows: Vec<ReportRow> = reporter.into();
        assert_eq!(
            rows,
            vec![ReportRow {
                strategy: MatchStrategy::TokenLevel,
                average: Average::None,
                precision: 0.75,
                recall: 0.75,
                f1: 0.75,
                support: 2
            }]
        );
    }

    #[rstest]
    #[case("none", Average::None)]
    #[case("Micro", Average::Micro)]
    #[case("MACRO", Average::Macro)]
    #[case("weighted", Average::Weighted)]
    fn test_average_from_str(#[case] input: &str, #[case] expected: Average) {
        assert_eq!(input.parse::<Average>().unwrap(), expected)
    }

    #[test]
    fn test_overall_averages_map_to_averages() {
        let actual: Vec<Average> = OverallAverage::ALL.into_iter().map(Average::from).collect();
        assert_eq!(actual, vec![Average::Macro, Average::Micro, Average::Weighted]);
    }

    #[test]
    fn test_retain_averages() {
        let mut reporter = Reporter::default();
        reporter.insert(row(MatchStrategy::Exact, Average::Macro, 0.5));
        reporter.insert(row(MatchStrategy::Exact, Average::Micro, 0.25));
        reporter.insert(row(MatchStrategy::TokenLevel, Average::Weighted, 1.0));
        let averages: Vec<Average> = "macro,weighted"
            .split(',')
            .map(|a| a.parse().unwrap())
            .collect();
        reporter.retain_averages(&averages);
        let expected = "Strategy, Average, Precision, Recall, F1, Support
Exact, Macro, 0.5, 0.5, 0.5, 2
TokenLevel, Weighted, 1, 1, 1, 2\n";
        assert_eq!(reporter.to_string(), expected);
    }
}
