use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spaneval::{
    evaluate_conf, evaluate_corpus, link_corpus, read_gold, read_ids, read_predicted_spans,
    Average, CorpusLayout, DivByZeroStrat, EmbeddingScorer, EncoderHandle, EvalConfigBuilder,
    GoldFilter, HashingEncoder, LexicalScorer, LinkOutcome, MatchStrategy,
};
use std::io::{stdout, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "spaneval", about = "Evaluates predicted clinical spans and links ADR mentions")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluates the predictions of a single document
    Eval {
        /// Identifier of the document, with or without the `.txt` suffix
        gold_id: String,
        /// Predicted spans file of the document
        predicted_json: PathBuf,
        #[arg(long, default_value = "cadec/original")]
        gold_dir: PathBuf,
        /// Strategies to evaluate, all of them by default
        #[arg(short, long, value_delimiter = ',')]
        strategy: Vec<MatchStrategy>,
        #[arg(short, long, default_value = "replaceby0")]
        zero_division: DivByZeroStrat,
    },
    /// Evaluates the predictions of every listed document and averages them
    Corpus {
        /// File listing one document identifier per line
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, default_value = "cadec/original")]
        gold_dir: PathBuf,
        #[arg(long, default_value = "predictions")]
        predictions_dir: PathBuf,
        #[arg(short, long, value_delimiter = ',')]
        strategy: Vec<MatchStrategy>,
        /// Averages to print, all of them by default
        #[arg(short, long, value_delimiter = ',')]
        average: Vec<Average>,
        #[arg(short, long, default_value = "replaceby0")]
        zero_division: DivByZeroStrat,
        /// Evaluates the documents on multiple cores
        #[arg(long)]
        parallel: bool,
        /// Writes the per-document results as JSON lines
        #[arg(long)]
        jsonl: Option<PathBuf>,
    },
    /// Links the gold ADR mentions of every listed document to its vocabulary entries
    Link {
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, default_value = "cadec/original")]
        gold_dir: PathBuf,
        #[arg(long, default_value = "cadec/sct")]
        vocabulary_dir: PathBuf,
        /// Dimensions of the hashing encoder vectors
        #[arg(long, default_value_t = 256)]
        dimensions: usize,
    },
}

fn config(
    strategy: Vec<MatchStrategy>,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> spaneval::EvalConfig {
    let builder = EvalConfigBuilder::default()
        .division_by_zero(zero_division)
        .parallel(parallel);
    if strategy.is_empty() {
        builder.build()
    } else {
        builder.strategies(strategy).build()
    }
}

/// Code, vocabulary text and score of a link. `no_match` is printed in place of the score when
/// there was no candidate.
fn outcome(outcome: &LinkOutcome, no_match: &str) -> String {
    match outcome {
        LinkOutcome::Matched(scored) => format!(
            "{}, {}, {:.4}",
            scored.candidate.code, scored.candidate.vocabulary_text, scored.score
        ),
        LinkOutcome::NoMatch => format!(", , {}", no_match),
    }
}

fn run<W: Write>(command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Eval {
            gold_id,
            predicted_json,
            gold_dir,
            strategy,
            zero_division,
        } => {
            let gold_path = CorpusLayout::new(gold_dir, ".").gold_path(&gold_id);
            let (gold, gold_stats) = read_gold(&gold_path, GoldFilter::All)
                .with_context(|| format!("reading {}", gold_path.display()))?;
            let (predicted, predicted_stats) = read_predicted_spans(&predicted_json)
                .with_context(|| format!("reading {}", predicted_json.display()))?;
            info!(?gold_stats, ?predicted_stats, "document loaded");
            let config = config(strategy, zero_division, false);
            let reporter = evaluate_conf(&gold, &predicted, &config)?;
            write!(out, "{}", reporter)?;
        }
        Command::Corpus {
            ids,
            gold_dir,
            predictions_dir,
            strategy,
            average,
            zero_division,
            parallel,
            jsonl,
        } => {
            let ids = read_ids(&ids)?;
            let layout = CorpusLayout::new(gold_dir, predictions_dir);
            let corpus = layout.load_all(&ids)?;
            let config = config(strategy, zero_division, parallel);
            info!(%config, "evaluating corpus");
            let mut report = evaluate_corpus(&corpus, &config)?;
            if let Some(path) = jsonl {
                serde_jsonlines::write_json_lines(&path, &report.evaluations)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if !average.is_empty() {
                report.reporter.retain_averages(&average);
            }
            write!(out, "{}", report.reporter)?;
            writeln!(
                out,
                "Documents: {}, Skipped: {}, Malformed records: {}",
                report.reporter.documents(),
                report.reporter.skipped(),
                report.reporter.malformed()
            )?;
        }
        Command::Link {
            ids,
            gold_dir,
            vocabulary_dir,
            dimensions,
        } => {
            let ids = read_ids(&ids)?;
            let layout = CorpusLayout::new(gold_dir, ".").with_vocabulary_dir(vocabulary_dir);
            let encoder = EncoderHandle::new(HashingEncoder::new(dimensions));
            let embedding = EmbeddingScorer::new(encoder.clone());
            let reports = link_corpus(&layout, &ids, &LexicalScorer, &embedding)?;
            writeln!(
                out,
                "Document, Mention, Lexical code, Lexical text, Lexical score, Embedding code, Embedding text, Embedding score"
            )?;
            for report in reports.iter() {
                for comparison in report.comparisons.iter() {
                    writeln!(
                        out,
                        "{}, {}, {}, {}",
                        report.document,
                        comparison.mention,
                        outcome(&comparison.lexical, "0"),
                        outcome(&comparison.embedding, "N/A")
                    )?;
                }
            }
            let agreements: usize = reports.iter().map(|r| r.agreements()).sum();
            let mentions: usize = reports.iter().map(|r| r.comparisons.len()).sum();
            writeln!(out, "Mentions: {}, Agreements: {}", mentions, agreements)?;
            drop(embedding);
            encoder.shutdown();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    run(args.command, &mut stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs::{create_dir_all, write};

    #[test]
    fn test_missing_predicted_json_is_a_usage_error() {
        let actual = Args::try_parse_from(["spaneval", "eval", "ARTHROTEC.1"]);
        let err = actual.unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
        assert!(err.to_string().contains("Usage"));
    }

    #[test]
    fn test_strategies_are_comma_separated() {
        let args = Args::try_parse_from([
            "spaneval",
            "eval",
            "ARTHROTEC.1.txt",
            "predicted.json",
            "--strategy",
            "relaxed,exact",
        ])
        .unwrap();
        match args.command {
            Command::Eval { strategy, .. } => assert_eq!(
                strategy,
                vec![MatchStrategy::RelaxedOverlap, MatchStrategy::Exact]
            ),
            command => panic!("unexpected command {:?}", command),
        }
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let actual = Args::try_parse_from([
            "spaneval",
            "eval",
            "ARTHROTEC.1",
            "predicted.json",
            "--strategy",
            "fuzzy",
        ]);
        assert!(actual.is_err());
    }

    #[test]
    fn test_eval_prints_one_row_per_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let gold_dir = dir.path().join("original");
        create_dir_all(&gold_dir).unwrap();
        write(
            gold_dir.join("ARTHROTEC.1.ann"),
            "T1\tADR 9 19\tbit drowsy\nT2\tDrug 93 102\tArthrotec\n",
        )
        .unwrap();
        let predicted = dir.path().join("ARTHROTEC.1_predicted_spans.json");
        write(
            &predicted,
            r#"[["ADR", 13, 19, "drowsy"], ["Drug", 93, 102, "arthrotec"]]"#,
        )
        .unwrap();
        let args = Args::try_parse_from([
            OsStr::new("spaneval"),
            OsStr::new("eval"),
            OsStr::new("ARTHROTEC.1.txt"),
            predicted.as_os_str(),
            OsStr::new("--gold-dir"),
            gold_dir.as_os_str(),
            OsStr::new("--strategy"),
            OsStr::new("exact,relaxed"),
        ])
        .unwrap();
        let mut out = Vec::new();
        run(args.command, &mut out).unwrap();
        let expected = "Strategy, Average, Precision, Recall, F1, Support
Exact, None, 0.5, 0.5, 0.5, 2
RelaxedOverlap, None, 1, 1, 1, 2\n";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_corpus_prints_the_selected_averages_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path().join("A.1.ann"), "T1\tADR 0 6\tnausea\nT2\tADR x 9\tbad\n").unwrap();
        write(
            dir.path().join("A.1_predicted_spans.json"),
            r#"[["ADR", 0, 6, "nausea"], 42]"#,
        )
        .unwrap();
        let ids = dir.path().join("ids.txt");
        write(&ids, "A.1.txt\nB.2.txt\n").unwrap();
        let args = Args::try_parse_from([
            OsStr::new("spaneval"),
            OsStr::new("corpus"),
            OsStr::new("--ids"),
            ids.as_os_str(),
            OsStr::new("--gold-dir"),
            dir.path().as_os_str(),
            OsStr::new("--predictions-dir"),
            dir.path().as_os_str(),
            OsStr::new("--strategy"),
            OsStr::new("exact"),
            OsStr::new("--average"),
            OsStr::new("macro"),
        ])
        .unwrap();
        let mut out = Vec::new();
        run(args.command, &mut out).unwrap();
        let expected = "Strategy, Average, Precision, Recall, F1, Support
Exact, Macro, 1, 1, 1, 1
Documents: 1, Skipped: 1, Malformed records: 2\n";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_embedding_without_candidate_is_not_applicable() {
        assert_eq!(outcome(&LinkOutcome::NoMatch, "0"), ", , 0");
        assert_eq!(outcome(&LinkOutcome::NoMatch, "N/A"), ", , N/A");
    }
}
