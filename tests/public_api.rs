use spaneval::{
    best_match, evaluate_conf, evaluate_corpus, link_corpus, merge_predictions, read_ids,
    write_predicted_spans, Average, Candidate, CorpusLayout, EmbeddingScorer, EncoderHandle,
    Entity, EvalConfigBuilder, HashingEncoder, LabelMap, LexicalScorer, MatchStrategy,
    RawPrediction, ReportRow,
};
use std::fs::write;

pub trait CloseEnough {
    fn are_close(&self, other: &Self, eps: f32) -> bool;
}

// ReportRow compares its floats exactly.
impl CloseEnough for ReportRow {
    fn are_close(&self, other: &Self, eps: f32) -> bool {
        let are_equal = self.strategy == other.strategy && self.average == other.average;
        let precision_is_equal = f32::abs(self.precision - other.precision) < eps;
        let recall_is_equal = f32::abs(self.recall - other.recall) < eps;
        let f1_is_equal = f32::abs(self.f1 - other.f1) < eps;
        are_equal && precision_is_equal && recall_is_equal && f1_is_equal
    }
}

fn row(strategy: MatchStrategy, average: Average, p: f32, r: f32, f1: f32, support: usize) -> ReportRow {
    ReportRow {
        strategy,
        average,
        precision: p,
        recall: r,
        f1,
        support,
    }
}

#[test]
fn exact_match_of_a_single_drug() {
    let gold = vec![Entity::new("Drug", 0, 5, "zocor").unwrap()];
    let predicted = vec![Entity::new("Drug", 0, 5, "zocor").unwrap()];
    let config = EvalConfigBuilder::default()
        .strategies([MatchStrategy::Exact])
        .build();
    let reporter = evaluate_conf(&gold, &predicted, &config).unwrap();
    let actual = reporter.get(MatchStrategy::Exact, Average::None).unwrap();
    assert!(actual.are_close(
        &row(MatchStrategy::Exact, Average::None, 1.0, 1.0, 1.0, 1),
        1e-6
    ));
}

#[test]
fn partial_span_is_only_a_relaxed_match() {
    let gold = vec![Entity::new("ADR", 10, 20, "muscle pain").unwrap()];
    let predicted = vec![Entity::new("ADR", 12, 16, "pain").unwrap()];
    let reporter = evaluate_conf(&gold, &predicted, &EvalConfigBuilder::default().build()).unwrap();
    let f1 = |strategy| reporter.get(strategy, Average::None).unwrap().f1;
    assert_eq!(f1(MatchStrategy::RelaxedOverlap), 1.0);
    assert_eq!(f1(MatchStrategy::Exact), 0.0);
    assert_eq!(f1(MatchStrategy::ExactOffset), 0.0);
}

#[test]
fn fan_out_yields_one_entity_per_canonical_label() {
    let post = "Terrible nausea since yesterday";
    let predictions = vec![RawPrediction::new("Sign_symptom", 9, 15)];
    let (entities, stats) = merge_predictions(&predictions, post, &LabelMap::default());
    assert_eq!(stats.emitted, 2);
    let actual: Vec<_> = entities
        .iter()
        .map(|e| (e.label(), e.span(), e.text()))
        .collect();
    assert_eq!(
        actual,
        vec![
            ("Symptom", Some((9, 15)), "nausea"),
            ("ADR", Some((9, 15)), "nausea"),
        ]
    );
}

#[test]
fn empty_predictions_give_zero_metrics() {
    let gold = vec![
        Entity::new("ADR", 0, 6, "nausea").unwrap(),
        Entity::new("Drug", 20, 25, "zocor").unwrap(),
    ];
    let reporter = evaluate_conf(&gold, &[], &EvalConfigBuilder::default().build()).unwrap();
    for actual in reporter.rows() {
        assert_eq!(actual.precision, 0.0);
        assert_eq!(actual.recall, 0.0);
        assert_eq!(actual.f1, 0.0);
    }
}

#[test]
fn lexical_linking_selects_the_same_words() {
    let candidates = vec![
        Candidate::new("X1", "feeling sick"),
        Candidate::new("X2", "nausea"),
    ];
    let actual = best_match(&LexicalScorer, "nausea", &candidates).unwrap();
    assert_eq!(actual.code(), Some("X2"));
}

const ARTHROTEC_GOLD: &str = "T1\tADR 9 19\tbit drowsy
T2\tADR 29 50\tlittle blurred vision
T3\tDrug 93 102\tArthrotec
#1\tAnnotatorNotes T1\tsleepy
";

const ARTHROTEC_SCT: &str = "TT1\t271782001 | Drowsy | 9 19\tbit drowsy
TT2\t246636008 | Blurred vision | 29 50\tlittle blurred vision
";

#[test]
fn corpus_evaluation_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let gold_dir = dir.path().join("original");
    let predictions_dir = dir.path().join("predictions");
    std::fs::create_dir_all(&gold_dir).unwrap();
    std::fs::create_dir_all(&predictions_dir).unwrap();
    write(gold_dir.join("ARTHROTEC.1.ann"), ARTHROTEC_GOLD).unwrap();
    write(gold_dir.join("LIPITOR.1.ann"), "T1\tADR 0 11\tmuscle pain\n").unwrap();
    write_predicted_spans(
        predictions_dir.join("ARTHROTEC.1_predicted_spans.json"),
        &[
            Entity::new("ADR", 13, 19, "drowsy").unwrap(),
            Entity::new("ADR", 36, 50, "blurred vision").unwrap(),
            Entity::new("Drug", 93, 102, "Arthrotec").unwrap(),
        ],
    )
    .unwrap();
    let ids_path = dir.path().join("ids.txt");
    write(&ids_path, "ARTHROTEC.1.txt\nLIPITOR.1.txt\n").unwrap();

    let layout = CorpusLayout::new(&gold_dir, &predictions_dir);
    let corpus = layout.load_all(read_ids(&ids_path).unwrap()).unwrap();
    assert_eq!(corpus.documents.len(), 1);
    assert_eq!(corpus.skipped, vec!["LIPITOR.1"]);

    let sequential = evaluate_corpus(&corpus, &EvalConfigBuilder::default().build()).unwrap();
    let parallel = evaluate_corpus(
        &corpus,
        &EvalConfigBuilder::default().parallel(true).build(),
    )
    .unwrap();
    assert_eq!(sequential, parallel);

    let reporter = &sequential.reporter;
    assert_eq!(reporter.skipped(), 1);
    let exact = reporter
        .get(MatchStrategy::Exact, Average::Macro)
        .unwrap();
    assert!(exact.are_close(
        &row(MatchStrategy::Exact, Average::Macro, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 3),
        1e-6
    ));
    let relaxed = reporter
        .get(MatchStrategy::RelaxedOverlap, Average::Macro)
        .unwrap();
    assert!(relaxed.are_close(
        &row(MatchStrategy::RelaxedOverlap, Average::Macro, 1.0, 1.0, 1.0, 3),
        1e-6
    ));
    for actual in reporter.rows() {
        assert!((0.0..=1.0).contains(&actual.f1));
    }
}

#[test]
fn corpus_linking_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let gold_dir = dir.path().join("original");
    let sct_dir = dir.path().join("sct");
    std::fs::create_dir_all(&gold_dir).unwrap();
    std::fs::create_dir_all(&sct_dir).unwrap();
    write(gold_dir.join("ARTHROTEC.1.ann"), ARTHROTEC_GOLD).unwrap();
    write(sct_dir.join("ARTHROTEC.1.ann"), ARTHROTEC_SCT).unwrap();

    let layout = CorpusLayout::new(&gold_dir, dir.path()).with_vocabulary_dir(&sct_dir);
    let embedding = EmbeddingScorer::new(EncoderHandle::new(HashingEncoder::new(128)));
    let reports = link_corpus(
        &layout,
        ["ARTHROTEC.1", "MISSING.1"],
        &LexicalScorer,
        &embedding,
    )
    .unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.document, "ARTHROTEC.1");
    let codes: Vec<_> = report
        .comparisons
        .iter()
        .map(|c| (c.mention.as_str(), c.lexical.code()))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("bit drowsy", Some("271782001")),
            ("little blurred vision", Some("246636008")),
        ]
    );
    assert_eq!(report.comparisons[0].lexical.score(), Some(100.0));
}
