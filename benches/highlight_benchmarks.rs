//! Highlight pass benchmarks
//!
//! Targets:
//! - Pattern build: <5ms for 2,000 entries
//! - Full pass (unmark + mark): <20ms for a 200-paragraph article

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lingomarker_core::{Document, Entry, HighlightRenderer, WordFormIndex};

const WORDS: &[&str] = &[
    "river", "stone", "lantern", "harbor", "meadow", "whisper", "thunder", "candle", "orchard",
    "compass", "errand", "quarry", "ladder", "blossom", "anchor", "glacier",
];

fn entries(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let word = format!("{}{}", WORDS[i % WORDS.len()], i / WORDS.len());
            Entry {
                uuid: format!("u-{}", i),
                forms_pipe_separated: Some(format!("{w}|{w}s|{w}ed", w = word)),
                word,
                created_at: None,
                updated_at: None,
            }
        })
        .collect()
}

fn article(paragraphs: usize) -> Document {
    let mut doc = Document::new();
    let body = doc.body();
    for i in 0..paragraphs {
        let p = doc.append_element(body, "p", &[]);
        let sentence: Vec<String> = (0..40)
            .map(|j| format!("{}{}", WORDS[(i + j) % WORDS.len()], j % 8))
            .collect();
        doc.append_text(p, &sentence.join(" "));
    }
    doc
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for count in [100, 500, 2000] {
        let entries = entries(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| WordFormIndex::build(black_box(entries)).unwrap());
        });
    }

    group.finish();
}

fn bench_highlight_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("highlight_pass");
    let index = WordFormIndex::build(&entries(500)).unwrap();
    let pattern = index.pattern().unwrap().clone();

    for paragraphs in [20, 200] {
        group.bench_with_input(
            BenchmarkId::from_parameter(paragraphs),
            &paragraphs,
            |b, &paragraphs| {
                let mut doc = article(paragraphs);
                let renderer = HighlightRenderer::new();
                b.iter(|| {
                    renderer.unmark(&mut doc);
                    black_box(renderer.mark(&mut doc, &pattern))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_index_build, bench_highlight_pass);
criterion_main!(benches);
