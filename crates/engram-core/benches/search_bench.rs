//! Engram Search Benchmarks
//!
//! Benchmarks for core search operations using Criterion.
//! Run with: cargo bench -p engram-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engram_core::retrieval::plan_heuristic;
use engram_core::search::{linear_combination, reciprocal_rank_fusion, sanitize_fts5_query};
use engram_core::vectormath::cosine_similarity;

fn bench_plan_heuristic(c: &mut Criterion) {
    let queries = [
        "What does the user prefer?",
        "how to configure embeddings",
        "why did the contradiction resolve that way",
        "fn main()",
        "engram memory engine",
    ];

    c.bench_function("plan_heuristic", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(plan_heuristic(q));
            }
        })
    });
}

fn bench_rrf_fusion(c: &mut Criterion) {
    let keyword_results: Vec<(String, f32)> = (0..50)
        .map(|i| (format!("doc-{i}"), 1.0 - i as f32 / 50.0))
        .collect();
    let semantic_results: Vec<(String, f32)> = (0..50)
        .map(|i| (format!("doc-{}", 25 + i), 1.0 - i as f32 / 50.0))
        .collect();

    c.bench_function("rrf_50x50", |b| {
        b.iter(|| {
            black_box(reciprocal_rank_fusion(
                &keyword_results,
                &semantic_results,
                60.0,
            ));
        })
    });
}

fn bench_linear_combination(c: &mut Criterion) {
    let keyword_results: Vec<(String, f32)> = (0..50)
        .map(|i| (format!("doc-{i}"), 1.0 - i as f32 / 50.0))
        .collect();
    let semantic_results: Vec<(String, f32)> = (0..50)
        .map(|i| (format!("doc-{}", 25 + i), 1.0 - i as f32 / 50.0))
        .collect();

    c.bench_function("linear_combo_50x50", |b| {
        b.iter(|| {
            black_box(linear_combination(
                &keyword_results,
                &semantic_results,
                0.3,
                0.7,
            ));
        })
    });
}

fn bench_sanitize_fts5(c: &mut Criterion) {
    c.bench_function("sanitize_fts5_query", |b| {
        b.iter(|| {
            black_box(sanitize_fts5_query(
                "hello world \"exact phrase\" OR special-chars!@#",
            ));
        })
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_256d", |b_bench| {
        b_bench.iter(|| {
            black_box(cosine_similarity(&a, &b));
        })
    });
}

criterion_group!(
    benches,
    bench_plan_heuristic,
    bench_rrf_fusion,
    bench_linear_combination,
    bench_sanitize_fts5,
    bench_cosine_similarity,
);
criterion_main!(benches);
