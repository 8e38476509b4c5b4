use criterion::{criterion_group, criterion_main, Criterion};
use pprof::criterion::{Output, PProfProfiler};
use spaneval::{evaluate_corpus, Corpus, Document, Entities, Entity, EvalConfigBuilder};

const LABELS: [&str; 4] = ["Drug", "Disease", "Symptom", "ADR"];
const WORDS: [&str; 8] = [
    "muscle", "pain", "severe", "nausea", "blurred", "vision", "lipitor", "drowsy",
];

/// Deterministic corpus where every third prediction is shifted and every fifth is relabeled.
fn build_corpus(documents: usize, entities: usize) -> Corpus {
    let documents = (0..documents)
        .map(|d| {
            let mut gold = Vec::with_capacity(entities);
            let mut predicted = Vec::with_capacity(entities);
            for e in 0..entities {
                let start = e * 40;
                let text = format!("{} {}", WORDS[(d + e) % WORDS.len()], WORDS[e % WORDS.len()]);
                let end = start + text.len();
                let label = LABELS[(d * 7 + e) % LABELS.len()];
                gold.push(Entity::new(label, start, end, text.clone()).unwrap());
                let predicted_label = if e % 5 == 0 {
                    LABELS[(d * 7 + e + 1) % LABELS.len()]
                } else {
                    label
                };
                let shift = if e % 3 == 0 { 2 } else { 0 };
                predicted.push(Entity::new(predicted_label, start + shift, end, text).unwrap());
            }
            Document::new(
                format!("DOCUMENT.{}", d),
                Entities::new(gold),
                Entities::new(predicted),
            )
        })
        .collect();
    Corpus {
        documents,
        skipped: vec![],
    }
}

fn benchmark_small_corpus(c: &mut Criterion) {
    let corpus = build_corpus(100, 20);
    let config = EvalConfigBuilder::default().build();
    c.bench_function("small_corpus_report", |b| {
        b.iter(|| evaluate_corpus(&corpus, &config).unwrap())
    });
}

fn benchmark_big_corpus(c: &mut Criterion) {
    let corpus = build_corpus(1250, 40);
    let config = EvalConfigBuilder::default().build();
    c.bench_function("big_corpus_report", |b| {
        b.iter(|| evaluate_corpus(&corpus, &config).unwrap())
    });
}

fn benchmark_big_corpus_parallel(c: &mut Criterion) {
    let corpus = build_corpus(1250, 40);
    let config = EvalConfigBuilder::default().parallel(true).build();
    c.bench_function("big_corpus_report_parallel", |b| {
        b.iter(|| evaluate_corpus(&corpus, &config).unwrap())
    });
}

criterion_group!(
    name=corpus_report_benches;
    config = Criterion::default().sample_size(50).with_profiler(PProfProfiler::new(3000, Output::Flamegraph(None)));
    targets = benchmark_small_corpus,
    benchmark_big_corpus,
    benchmark_big_corpus_parallel
);
criterion_main!(corpus_report_benches);
