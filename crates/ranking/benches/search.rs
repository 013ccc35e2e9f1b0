//! Search and scoring throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use screener_core::{Entity, ScoreWeights, SearchConfig};
use screener_ranking::{SearchIndex, TrendingScorer};

fn sample_entities(n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| Entity {
            id: format!("token-{i}"),
            address: format!("0x{i:040x}"),
            name: format!("Sample Token {i}"),
            symbol: format!("TK{i}"),
            created_at: None,
            market_cap: (i as f64) * 1_000.0,
            volume_24h: (i as f64) * 37.0,
            market_cap_delta_24h: (i as f64) - 250.0,
            unique_holders: (i as u64) * 3,
            image_uri: None,
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let entities = sample_entities(500);
    let scorer = TrendingScorer::new(ScoreWeights::default());

    c.bench_function("score_500", |b| {
        b.iter(|| scorer.score(black_box(&entities)))
    });
}

fn bench_search(c: &mut Criterion) {
    let entities = sample_entities(500);
    let index = SearchIndex::build(&entities, SearchConfig::default());

    c.bench_function("search_500", |b| {
        b.iter(|| index.search(black_box("sample token 42"), 15))
    });

    c.bench_function("index_build_500", |b| {
        b.iter(|| SearchIndex::build(black_box(&entities), SearchConfig::default()))
    });
}

criterion_group!(benches, bench_scoring, bench_search);
criterion_main!(benches);
