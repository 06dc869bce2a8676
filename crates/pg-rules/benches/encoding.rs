use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pg_rules::{RuleBuilder, RuleDocument, RuleSet};

fn encode_catalog(c: &mut Criterion) {
    let documents: Vec<RuleDocument> = RuleSet::ALL.iter().map(RuleSet::document).collect();
    c.bench_function("encode_catalog", |b| {
        b.iter(|| {
            for doc in &documents {
                black_box(doc.to_json().ok());
            }
        })
    });
}

fn build_custom(c: &mut Criterion) {
    c.bench_function("build_custom", |b| {
        b.iter(|| {
            let builder = (0..64).fold(RuleBuilder::new(), |builder, i| {
                builder
                    .block_url(format!(r".*/ads/{}\.js", i))
                    .whitelist(format!(r"cdn\.example\.com/{}", i))
            });
            black_box(builder.build().ok())
        })
    });
}

fn decode_catalog(c: &mut Criterion) {
    let encoded: Vec<String> = RuleSet::ALL
        .iter()
        .filter_map(|set| set.document().to_json().ok())
        .collect();
    c.bench_function("decode_catalog", |b| {
        b.iter(|| {
            for text in &encoded {
                black_box(RuleDocument::from_json(text).ok());
            }
        })
    });
}

criterion_group!(benches, encode_catalog, build_custom, decode_catalog);
criterion_main!(benches);
