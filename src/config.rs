/*!
This modules contains the `EvalConfig` struct, which implements the default trait, and its
builder. The config can be passed to the `evaluate_conf` function or to the `evaluate_corpus`
function to simplify their arguments.
*/
use crate::matching::MatchStrategy;
use crate::metrics::DivByZeroStrat;
use either::Either as LeftOrRight;
use enum_iterator::all;
use itertools::Itertools;
use std::fmt::Display;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
/// Config struct used to simplify the inputs of the evaluation functions. It implements the
/// default trait: every strategy, `0.0` on a zero denominator and no parallelism.
pub struct EvalConfig {
    /// The matching strategies to evaluate, in report order. Duplicates are ignored.
    pub(crate) strategies: Vec<MatchStrategy>,
    /// This parameter describe what to do when we encounter a division by zero when computing
    /// precision and recall. The most common solution is to replace the results by 0.
    pub(crate) zero_division: DivByZeroStrat,
    /// Can we evaluate the documents of a corpus on multiple cores? The per-document results are
    /// reduced in document order either way.
    pub(crate) parallel: bool,
}

impl EvalConfig {
    pub fn new() -> Self {
        Self {
            strategies: all::<MatchStrategy>().collect(),
            zero_division: DivByZeroStrat::ReplaceBy0,
            parallel: false,
        }
    }

    pub fn strategies(&self) -> &[MatchStrategy] {
        &self.strategies
    }

    pub fn zero_division(&self) -> DivByZeroStrat {
        self.zero_division
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<ZeroDiv> From<EvalConfigBuilder<ZeroDiv>> for EvalConfig
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    fn from(value: EvalConfigBuilder<ZeroDiv>) -> Self {
        Self {
            strategies: value.strategies.into_iter().unique().collect(),
            zero_division: value.zero_division.either_into(),
            parallel: value.parallel,
        }
    }
}

impl From<EvalConfig> for (Vec<MatchStrategy>, DivByZeroStrat, bool) {
    fn from(value: EvalConfig) -> Self {
        (value.strategies, value.zero_division, value.parallel)
    }
}

impl Display for EvalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!(
            "Matching strategies: {}\n Strategy when encountering a division by zero: {:?}\n Using parallel computations: {}",
            self.strategies.iter().join(", "),
            self.zero_division,
            self.parallel
        );
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize an `EvalConfig` stucture.
pub struct EvalConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    strategies: Vec<MatchStrategy>,
    zero_division: LeftOrRight<ZeroDiv, DivByZeroStrat>,
    parallel: bool,
}

impl Default for EvalConfigBuilder<DivByZeroStrat> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ZeroDiv> EvalConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    pub fn strategies<I: IntoIterator<Item = MatchStrategy>>(mut self, strategies: I) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }
    pub fn division_by_zero(mut self, division_by_zero: ZeroDiv) -> Self {
        self.zero_division = LeftOrRight::Left(division_by_zero);
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn new() -> Self {
        Self {
            strategies: all::<MatchStrategy>().collect(),
            zero_division: LeftOrRight::Right(DivByZeroStrat::ReplaceBy0),
            parallel: false,
        }
    }
    pub fn build(self) -> EvalConfig {
        EvalConfig::from(self)
    }
}
